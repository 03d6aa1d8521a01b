//! # xpra-client - headless Xpra client
//!
//! Connects to an Xpra server over TCP, completes the handshake, keeps
//! the session alive and acknowledges draws. Input events can be
//! scripted on stdin.

pub mod config;
pub mod display;
pub mod input;
