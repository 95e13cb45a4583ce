pub mod client;
pub mod error;
pub mod request;
pub mod stream;

/// Generated protobuf/gRPC bindings for the generation service.
pub mod pb {
    tonic::include_proto!("streamservice");
}

pub use client::{GenClient, Generator};
pub use error::GenError;
pub use request::GenRequest;
pub use stream::{classify_frame, Frame, FrameStream, DONE_SENTINEL};
