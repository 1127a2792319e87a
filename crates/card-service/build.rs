//! Build script for card-service.
//!
//! Messages are declared with prost derives in `src/pb.rs`; only the
//! service plumbing is generated here, so no protoc is needed at build time.

use tonic_build::manual::{Builder, Method, Service};

fn main() {
    let service = Service::builder()
        .name("CardService")
        .package("card")
        .method(
            Method::builder()
                .name("identify")
                .route_name("Identify")
                .input_type("crate::pb::IdentifyRequest")
                .output_type("crate::pb::IdentifyResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            Method::builder()
                .name("get_catalog_status")
                .route_name("GetCatalogStatus")
                .input_type("crate::pb::GetCatalogStatusRequest")
                .output_type("crate::pb::CatalogStatus")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    Builder::new().compile(&[service]);
    println!("cargo:rerun-if-changed=build.rs");
}
