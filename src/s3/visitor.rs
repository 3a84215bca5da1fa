//! Callbacks through which bulk operations receive streamed results

use crate::s3::types::{DeleteResult, ListingPage};

/// Receives listing pages in order.
///
/// Returning `false` stops the listing before the next page is fetched.
/// The method is async so a visitor can run object operations (e.g.
/// downloads) against the same client while the listing is in progress.
#[allow(async_fn_in_trait)]
pub trait ListingVisitor {
    async fn visit_listing(&mut self, page: &ListingPage) -> bool;
}

/// Receives the decoded result of a batch delete.
///
/// Failed keys are ordinary data here; whether they fail the command is the
/// visitor's (or its owner's) decision. A delete is a single batch, so
/// returning `false` only gets logged; nothing else is left to stop.
pub trait DeletionVisitor {
    fn visit_deletion(&mut self, result: &DeleteResult) -> bool;
}
