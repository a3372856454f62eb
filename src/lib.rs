// ==============================================================================
// lib.rs - Regulome Scorer Library
// ==============================================================================
// Description: Library interface for the variant feature pipeline and scorer
// Author: Matt Barham
// Created: 2026-09-02
// Modified: 2026-10-12
// Version: 1.2.0
// ==============================================================================

pub mod parsers;
pub mod models;
pub mod join;
pub mod signal_track;
pub mod generic_features;
pub mod class_merge;
pub mod organ_features;
pub mod assembler;
pub mod predictor;
pub mod output;
pub mod config;
pub mod processor;
