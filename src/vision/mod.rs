/// Vision model access
///
/// This module handles:
/// - Shrinking and re-encoding source photos for the model (preprocess.rs)
/// - Talking to the inference server (client.rs)

pub mod client;
pub mod preprocess;
