//! Data models for open-location discovery.

pub mod evidence;
mod license;
mod location;
mod queue;
mod target;
mod work;

pub use license::License;
pub use location::{HostType, OaStatus, OpenLocation, Version};
pub use queue::{QueueEntry, QueueState};
pub use target::{
    MatchType, ScrapeOutcome, ScrapeTarget, PUBLISHER_EQUIVALENT_ENDPOINT_ID,
    PUBLISHER_EQUIVALENT_PMH_ID,
};
pub use work::{
    CrossrefLicense, JournalPolicy, OpenListing, PmcLink, S2Lookup, StoredScrape, Work,
};
