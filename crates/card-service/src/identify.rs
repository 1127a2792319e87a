//! Identify and GetCatalogStatus RPC handlers.
//!
//! Maps the recognition pipeline onto request/response semantics:
//! malformed input is `INVALID_ARGUMENT`, an unloaded extractor or catalog
//! is `UNAVAILABLE`, anything else is `INTERNAL`. A response is either a
//! full match or an explicit `matched = false`, never something in between.

use std::sync::Arc;

use card_matcher::{Decision, FrameOutcome, MatchError, Recognizer, SkipReason};
use card_types::{Hit, MAX_TOP_K};
use card_vision::decode_image;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::pb::{
    Candidate, CatalogStatus, GetCatalogStatusRequest, IdentifyRequest, IdentifyResponse,
};

/// Handler for identification requests.
pub struct IdentifyHandler {
    recognizer: Arc<Recognizer>,
}

impl IdentifyHandler {
    pub fn new(recognizer: Arc<Recognizer>) -> Self {
        Self { recognizer }
    }

    /// Handle Identify RPC request.
    pub async fn identify(
        &self,
        request: Request<IdentifyRequest>,
    ) -> Result<Response<IdentifyResponse>, Status> {
        let req = request.into_inner();
        if req.image.is_empty() {
            return Err(Status::invalid_argument("image is required"));
        }

        self.recognizer.check_ready().map_err(match_status)?;

        debug!(bytes = req.image.len(), top_k = req.top_k, "Identify request");

        // A nonzero request widens or narrows the ranked list
        let top_k = if req.top_k > 0 {
            (req.top_k as usize).min(MAX_TOP_K)
        } else {
            self.recognizer.top_k()
        };

        let recognizer = self.recognizer.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let frame = decode_image(&req.image)
                .map_err(|e| Status::invalid_argument(format!("Cannot decode image: {}", e)))?;
            recognizer
                .recognize_frame_top_k(&frame, top_k)
                .map_err(match_status)
        })
        .await
        .map_err(|e| Status::internal(format!("Task error: {}", e)))??;

        let (ranked, decision) = match outcome {
            FrameOutcome::Decided { ranked, decision } => (ranked, decision),
            FrameOutcome::Skipped(SkipReason::SourceNotReady { width, height }) => {
                return Err(Status::invalid_argument(format!(
                    "Image has no pixels ({}x{})",
                    width, height
                )));
            }
            FrameOutcome::Skipped(SkipReason::DegenerateEmbedding(msg)) => {
                return Err(Status::invalid_argument(format!(
                    "Image carries no usable content: {}",
                    msg
                )));
            }
        };

        let top_k: Vec<Candidate> = ranked
            .iter()
            .take(top_k)
            .map(|hit| self.candidate(hit))
            .collect();

        let response = match decision {
            Decision::Accept(hit) => {
                info!(item_id = %hit.item_id, similarity = hit.similarity, "Identified");
                IdentifyResponse {
                    matched: true,
                    item_id: hit.item_id.clone(),
                    display_name: self.recognizer.display_name(&hit.item_id),
                    similarity: hit.similarity_percent(),
                    top_k,
                    reject_reason: String::new(),
                }
            }
            Decision::Reject(reason) => {
                debug!(?reason, "No confident match");
                IdentifyResponse {
                    matched: false,
                    item_id: String::new(),
                    display_name: String::new(),
                    similarity: 0.0,
                    top_k,
                    reject_reason: reason.to_string(),
                }
            }
        };

        Ok(Response::new(response))
    }

    /// Handle GetCatalogStatus RPC request.
    pub async fn get_catalog_status(
        &self,
        _request: Request<GetCatalogStatusRequest>,
    ) -> Result<Response<CatalogStatus>, Status> {
        Ok(Response::new(self.status()))
    }

    /// Current readiness and catalog shape.
    pub fn status(&self) -> CatalogStatus {
        let ready = self.recognizer.check_ready().is_ok();
        match self.recognizer.catalog_slot().get() {
            Ok(loaded) => {
                let stats = loaded.catalog.stats();
                CatalogStatus {
                    ready,
                    model: stats.model,
                    dimension: stats.embedding_dim as u32,
                    entry_count: stats.entry_count as u64,
                    item_count: stats.item_count as u64,
                    built_at: stats.built_at.to_rfc3339(),
                    shape: stats.shape.as_str().to_string(),
                }
            }
            Err(_) => CatalogStatus {
                ready,
                ..Default::default()
            },
        }
    }

    fn candidate(&self, hit: &Hit) -> Candidate {
        Candidate {
            item_id: hit.item_id.clone(),
            display_name: self.recognizer.display_name(&hit.item_id),
            similarity: hit.similarity_percent(),
        }
    }
}

fn match_status(err: MatchError) -> Status {
    match err {
        MatchError::NotReady(msg) => Status::unavailable(msg),
        other => {
            warn!(error = %other, "Recognition failed");
            Status::internal(format!("Recognition failed: {}", other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use card_catalog::{Catalog, CatalogEntry, FlatIndex};
    use card_embeddings::{ExtractorSlot, FeatureExtractor, ThumbnailExtractor};
    use card_matcher::{CatalogSlot, DecisionPolicy};
    use card_types::CatalogShape;
    use card_vision::ImageNormalizer;
    use image::{ImageFormat, Rgb, RgbImage};
    use tonic::Code;

    const SIZE: u32 = 16;

    fn pattern(seed: u32) -> RgbImage {
        RgbImage::from_fn(SIZE, SIZE, |x, y| match seed % 3 {
            0 => {
                let t = (x * 16) as u8;
                Rgb([t, 0, 255 - t])
            }
            1 => Rgb([0, (y * 16) as u8, 128]),
            _ => {
                let t = ((x + y) * 8) as u8;
                Rgb([255 - t, t, 0])
            }
        })
    }

    fn png(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn handler(loaded: bool) -> IdentifyHandler {
        handler_with_top_k(loaded, 3)
    }

    fn handler_with_top_k(loaded: bool, server_top_k: usize) -> IdentifyHandler {
        let extractor = Arc::new(ThumbnailExtractor::new(4, SIZE, SIZE).unwrap());
        let catalog_slot = Arc::new(CatalogSlot::new());
        if loaded {
            let entries = [("sv01-001", 1), ("sv01-002", 2), ("sv01-003", 3)]
                .iter()
                .map(|(id, seed)| CatalogEntry {
                    item_id: id.to_string(),
                    display_name: format!("Card {}", seed),
                    source_filename: format!("{}_Card_{}.png", id, seed),
                    variant: "original".to_string(),
                    embedding: extractor.extract(&pattern(*seed)).unwrap(),
                })
                .collect();
            let catalog = Arc::new(
                Catalog::new(
                    extractor.info().identity(),
                    48,
                    (SIZE, SIZE),
                    CatalogShape::PerVariant,
                    0,
                    0,
                    entries,
                )
                .unwrap(),
            );
            let index = Arc::new(FlatIndex::new(catalog.clone()));
            catalog_slot.install(catalog, index);
        }
        let recognizer = Recognizer::new(
            ImageNormalizer::new(1.0, SIZE, SIZE).unwrap(),
            Arc::new(ExtractorSlot::with_extractor(extractor)),
            catalog_slot,
            DecisionPolicy::default(),
            server_top_k,
        );
        IdentifyHandler::new(Arc::new(recognizer))
    }

    #[tokio::test]
    async fn test_identify_match() {
        let handler = handler(true);
        let response = handler
            .identify(Request::new(IdentifyRequest {
                image: png(&pattern(2)),
                top_k: 2,
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.matched);
        assert_eq!(response.item_id, "sv01-002");
        assert_eq!(response.display_name, "Card 2");
        assert!(response.similarity > 99.0 && response.similarity <= 100.0);
        assert_eq!(response.top_k.len(), 2);
        assert_eq!(response.top_k[0].item_id, "sv01-002");
        assert!(response.reject_reason.is_empty());
    }

    #[tokio::test]
    async fn test_identify_default_top_k() {
        let response = handler(true)
            .identify(Request::new(IdentifyRequest {
                image: png(&pattern(1)),
                top_k: 0,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.top_k.len(), 3);
    }

    #[tokio::test]
    async fn test_request_top_k_overrides_server_default() {
        let handler = handler_with_top_k(true, 1);
        let identify = |top_k| {
            handler.identify(Request::new(IdentifyRequest {
                image: png(&pattern(3)),
                top_k,
            }))
        };

        let narrow = identify(0).await.unwrap().into_inner();
        assert_eq!(narrow.top_k.len(), 1);
        assert_eq!(narrow.item_id, "sv01-003");

        let wide = identify(3).await.unwrap().into_inner();
        assert_eq!(wide.top_k.len(), 3);
        assert_eq!(wide.top_k[0].item_id, "sv01-003");

        let huge = identify(u32::MAX).await.unwrap().into_inner();
        assert_eq!(huge.top_k.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_image_is_invalid_argument() {
        let status = handler(true)
            .identify(Request::new(IdentifyRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_invalid_argument() {
        let status = handler(true)
            .identify(Request::new(IdentifyRequest {
                image: b"not an image".to_vec(),
                top_k: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_blank_image_is_invalid_argument() {
        let blank = RgbImage::from_pixel(SIZE, SIZE, Rgb([200, 200, 200]));
        let status = handler(true)
            .identify(Request::new(IdentifyRequest {
                image: png(&blank),
                top_k: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_not_ready_is_unavailable() {
        let status = handler(false)
            .identify(Request::new(IdentifyRequest {
                image: png(&pattern(1)),
                top_k: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn test_catalog_status() {
        let status = handler(true)
            .get_catalog_status(Request::new(GetCatalogStatusRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(status.ready);
        assert_eq!(status.dimension, 48);
        assert_eq!(status.entry_count, 3);
        assert_eq!(status.item_count, 3);
        assert_eq!(status.shape, "per_variant");
        assert!(status.model.starts_with("thumbnail@"));

        let status = handler(false).status();
        assert!(!status.ready);
        assert_eq!(status.entry_count, 0);
    }
}
