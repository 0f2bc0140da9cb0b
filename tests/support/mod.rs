//! Shared helpers for integration tests.
#![allow(dead_code)]

pub mod socket_guard;

/// Smallest byte sequence sniffed as JPEG.
pub const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00\x01\x01\x00";

/// PNG signature plus the start of an IHDR chunk.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";

/// Base URL local assets are served under in tests.
pub const MEDIA_BASE: &str = "https://blog.example.org/media";
