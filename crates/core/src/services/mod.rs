//! Fetch, cache and merge services.
//!
//! Services borrow a [`CdrContext`] and are wired together explicitly by [`Services::new`].
//! They are small `Copy` handles; constructing them performs no I/O.

pub mod demographics;
pub mod discovery;
pub mod heading;
mod mapping;
pub mod record_state;
pub mod resource;
pub mod token;

pub use demographics::{Demographics, DemographicsService};
pub use discovery::{DiscoveryItem, DiscoveryService};
pub use heading::{HeadingFormat, HeadingService, WrittenRecord};
pub use record_state::RecordStateService;
pub use resource::{FetchOutcome, ResourceService};
pub use token::TokenService;

use crate::context::CdrContext;

/// The service graph for one request.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub token: TokenService<'a>,
    pub resource: ResourceService<'a>,
    pub heading: HeadingService<'a>,
    pub discovery: DiscoveryService<'a>,
    pub demographics: DemographicsService<'a>,
    pub record_state: RecordStateService<'a>,
}

impl<'a> Services<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        let token = TokenService::new(ctx);
        let resource = ResourceService::new(ctx, token);
        let heading = HeadingService::new(ctx);
        let discovery = DiscoveryService::new(ctx, resource, heading);
        let demographics = DemographicsService::new(ctx, resource);
        let record_state = RecordStateService::new(ctx, heading, discovery);

        Self {
            token,
            resource,
            heading,
            discovery,
            demographics,
            record_state,
        }
    }
}
