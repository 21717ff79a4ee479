//! lexharvest - enumerate the vocabulary behind a capped autocomplete endpoint.
//!
//! The endpoint answers a prefix with at most `N` matching words and offers no
//! other listing. [`harvest::Harvester`] walks the prefix space with a
//! child/sibling expansion rule, paced by [`rate_limit::Pacer`] and optionally
//! calibrated by [`rate_limit::probe`].

pub mod alphabet;
pub mod config;
pub mod harvest;
pub mod oracle;
pub mod rate_limit;
pub mod store;

pub use alphabet::{Alphabet, AlphabetPreset};
pub use harvest::{
    ExpansionPolicy, Fetcher, HarvestConfig, HarvestEvent, HarvestReport, Harvester,
    SiblingPolicy, StopReason,
};
pub use oracle::{HttpOracle, Oracle, OracleError, QueryResult};
pub use rate_limit::{Pacer, PacerConfig};
pub use store::{DiscoveryStore, FileSink, MemorySink, WordSink};
