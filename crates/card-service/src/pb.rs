//! Wire messages for `card.CardService`.
//!
//! ```proto
//! service CardService {
//!   rpc Identify(IdentifyRequest) returns (IdentifyResponse);
//!   rpc GetCatalogStatus(GetCatalogStatusRequest) returns (CatalogStatus);
//! }
//! ```

/// One encoded image (PNG or JPEG).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentifyRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub image: Vec<u8>,
    /// Ranked candidates to return; 0 uses the server default
    #[prost(uint32, tag = "2")]
    pub top_k: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Candidate {
    #[prost(string, tag = "1")]
    pub item_id: String,
    #[prost(string, tag = "2")]
    pub display_name: String,
    /// 0-100
    #[prost(float, tag = "3")]
    pub similarity: f32,
}

/// `matched` is false when the decision policy found no confident match;
/// the item fields are then empty and `reject_reason` says why.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdentifyResponse {
    #[prost(bool, tag = "1")]
    pub matched: bool,
    #[prost(string, tag = "2")]
    pub item_id: String,
    #[prost(string, tag = "3")]
    pub display_name: String,
    /// 0-100
    #[prost(float, tag = "4")]
    pub similarity: f32,
    #[prost(message, repeated, tag = "5")]
    pub top_k: Vec<Candidate>,
    #[prost(string, tag = "6")]
    pub reject_reason: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCatalogStatusRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CatalogStatus {
    /// Extractor and catalog are both loaded
    #[prost(bool, tag = "1")]
    pub ready: bool,
    #[prost(string, tag = "2")]
    pub model: String,
    #[prost(uint32, tag = "3")]
    pub dimension: u32,
    #[prost(uint64, tag = "4")]
    pub entry_count: u64,
    #[prost(uint64, tag = "5")]
    pub item_count: u64,
    /// RFC 3339
    #[prost(string, tag = "6")]
    pub built_at: String,
    #[prost(string, tag = "7")]
    pub shape: String,
}

include!(concat!(env!("OUT_DIR"), "/card.CardService.rs"));
