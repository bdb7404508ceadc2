pub mod proto {
    pub mod runner {
        tonic::include_proto!("kiln.v1");
    }
}

pub mod client;

/// Encoded file descriptor set for gRPC server reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("kiln_descriptor");

// Re-export all proto types at the crate root for convenience
pub use proto::runner::*;
