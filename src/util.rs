//! Shared utility modules used across spanlab components.

pub mod varint;
