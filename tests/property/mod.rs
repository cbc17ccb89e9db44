// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module

mod compile_invariants;
mod generator_phase;
mod labels;
mod subnets;
