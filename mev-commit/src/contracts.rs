//! Known mev-commit contract deployments.
//!
//! mev-commit contracts live on the mev-commit chain behind upgradeable
//! proxies, so the proxy addresses below stay stable across upgrades.
//! Deployments that move can be overridden at startup from configuration
//! (see [`crate::EventRegistry::mev_commit_with`]).

use std::fmt;

use alloy::primitives::{Address, address};

/// A mev-commit protocol contract that emits events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Contract {
    /// Tracks L1 blocks and their winning providers.
    BlockTracker,
    /// Holds bidder deposits per window.
    BidderRegistry,
    /// Holds provider stakes and applies slashing.
    ProviderRegistry,
    /// Stores opened and unopened preconfirmation commitments.
    PreconfManager,
    /// Settles commitments after the L1 block is known.
    Oracle,
}

const BLOCK_TRACKER: Address = address!("2eEbF31f5c932D51556E70235FB98bB2237d065c");
const BIDDER_REGISTRY: Address = address!("7ffa86fF89489Bca72Fec2a978e33f9870B2Bd25");
const PROVIDER_REGISTRY: Address = address!("1C2a592950E5dAd49c0E2F3A402DCF496bdf7b67");
const PRECONF_MANAGER: Address = address!("CAC68D97a56b19204Dd3dbDC103CB24D47A825A3");
const ORACLE: Address = address!("6856Eb630C79D491886E104D328834643f5a9Ca6");

impl Contract {
    /// All known contracts.
    pub const ALL: &[Self] = &[
        Self::BlockTracker,
        Self::BidderRegistry,
        Self::ProviderRegistry,
        Self::PreconfManager,
        Self::Oracle,
    ];

    /// Returns the default deployed address of this contract.
    #[must_use]
    pub const fn address(self) -> Address {
        match self {
            Self::BlockTracker => BLOCK_TRACKER,
            Self::BidderRegistry => BIDDER_REGISTRY,
            Self::ProviderRegistry => PROVIDER_REGISTRY,
            Self::PreconfManager => PRECONF_MANAGER,
            Self::Oracle => ORACLE,
        }
    }

    /// Returns the configuration key of this contract (e.g. `bidder_registry`).
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::BlockTracker => "block_tracker",
            Self::BidderRegistry => "bidder_registry",
            Self::ProviderRegistry => "provider_registry",
            Self::PreconfManager => "preconf_manager",
            Self::Oracle => "oracle",
        }
    }

    /// Look up a [`Contract`] by its configuration key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().find(|c| c.key() == key).copied()
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
