//! Media pipeline — audio decoding, voice activity detection, and the
//! streaming transcriber adapter.

pub mod audio;
#[cfg(feature = "opus")]
pub mod opus_decode;
pub mod transcriber;
pub mod vad;
