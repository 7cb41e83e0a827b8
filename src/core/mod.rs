pub mod paths;
pub mod payload;
pub mod pipeline;
pub mod poster;
pub mod retry;
pub mod stream;
pub mod tagger;
pub mod transcoder;
