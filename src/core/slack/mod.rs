pub mod blocks;
pub mod webhook;
