//! `card.CardService` implementation.

use std::sync::Arc;

use card_matcher::Recognizer;
use tonic::{Request, Response, Status};

use crate::identify::IdentifyHandler;
use crate::pb::{
    card_service_server::CardService, CatalogStatus, GetCatalogStatusRequest, IdentifyRequest,
    IdentifyResponse,
};

/// Implementation of the CardService gRPC service.
pub struct CardServiceImpl {
    identify: Arc<IdentifyHandler>,
}

impl CardServiceImpl {
    pub fn new(recognizer: Arc<Recognizer>) -> Self {
        Self {
            identify: Arc::new(IdentifyHandler::new(recognizer)),
        }
    }
}

#[tonic::async_trait]
impl CardService for CardServiceImpl {
    async fn identify(
        &self,
        request: Request<IdentifyRequest>,
    ) -> Result<Response<IdentifyResponse>, Status> {
        self.identify.identify(request).await
    }

    async fn get_catalog_status(
        &self,
        request: Request<GetCatalogStatusRequest>,
    ) -> Result<Response<CatalogStatus>, Status> {
        self.identify.get_catalog_status(request).await
    }
}
