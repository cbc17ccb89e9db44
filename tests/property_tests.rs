// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Entry Point
//!
//! This test suite uses proptest to check invariants that must hold for
//! every input: name validation, address pools, generator phases and the
//! topology compiler.

mod property;
