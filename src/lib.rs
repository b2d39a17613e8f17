//! Viewport, rendering, compositing and paste engine for cellular-automaton
//! patterns on an unbounded grid.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod cli;
pub mod components;
pub mod coords;
pub mod engine;
pub mod grid;
pub mod logger;
pub mod ops;
pub mod pool;
pub mod settings;
pub mod viewport;
