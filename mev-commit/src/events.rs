//! Event catalogue and the name/signature/topic registry.
//!
//! Every mev-commit event the extractor knows about is a variant of
//! [`EventKind`]; its wire signature, emitting contract and column types are
//! data returned by [`EventKind::definition`]. Adding an event is a data
//! change: add a variant and its definition.
//!
//! [`EventRegistry`] is built once at startup from a list of definitions,
//! parses every signature, and rejects duplicate names or signatures. After
//! construction it is read-only and can be shared freely across tasks.

use std::collections::HashMap;

use alloy::json_abi::Event;
use alloy::primitives::{Address, B256};

use crate::columns::{BLOCK_COLUMN_TYPES, ColumnType, ColumnTypes, TRANSACTION_COLUMN_TYPES};
use crate::contracts::Contract;
use crate::error::RegistryError;

/// Static description of one contract event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDefinition {
    /// Logical name used by callers (e.g. `"BidderRegistered"`).
    pub name: &'static str,
    /// Full Solidity declaration including parameter names and `indexed`.
    pub signature: &'static str,
    /// Contract that emits the event.
    pub contract: Address,
    /// Types applied to decoded event parameters.
    pub decoded_log_types: ColumnTypes,
    /// Types applied to joined transaction columns.
    pub transaction_column_types: ColumnTypes,
    /// Types applied to joined block columns.
    pub block_column_types: ColumnTypes,
}

impl EventDefinition {
    /// Define an event with the default transaction and block column types.
    #[must_use]
    pub const fn new(
        name: &'static str,
        signature: &'static str,
        contract: Address,
        decoded_log_types: ColumnTypes,
    ) -> Self {
        Self {
            name,
            signature,
            contract,
            decoded_log_types,
            transaction_column_types: TRANSACTION_COLUMN_TYPES,
            block_column_types: BLOCK_COLUMN_TYPES,
        }
    }

    /// Return a copy emitted by a different contract.
    #[must_use]
    pub const fn at(mut self, contract: Address) -> Self {
        self.contract = contract;
        self
    }

    /// Parse the signature into an ABI event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidSignature`] if the signature does not
    /// parse as a Solidity event declaration.
    pub fn parse(&self) -> Result<Event, RegistryError> {
        Event::parse(self.signature).map_err(|e| RegistryError::InvalidSignature {
            signature: self.signature.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Built-in mev-commit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventKind {
    /// An L1 block was recorded together with its winning provider.
    NewL1Block,
    /// A bidder deposited funds for a window.
    BidderRegistered,
    /// A bidder withdrew the deposit of a window.
    BidderWithdrawal,
    /// A commitment was opened and stored.
    OpenedCommitmentStored,
    /// An encrypted commitment was stored.
    UnopenedCommitmentStored,
    /// The oracle processed a commitment (reward or slash).
    CommitmentProcessed,
    /// Bidder funds were returned after settlement.
    FundsRetrieved,
    /// A provider was rewarded from bidder funds.
    FundsRewarded,
    /// A provider stake was slashed.
    FundsSlashed,
}

const AMOUNT_AND_WINDOW: ColumnTypes = &[
    ("window", ColumnType::Int64),
    ("amount", ColumnType::Float64),
];

impl EventKind {
    /// All built-in events.
    pub const ALL: &[Self] = &[
        Self::NewL1Block,
        Self::BidderRegistered,
        Self::BidderWithdrawal,
        Self::OpenedCommitmentStored,
        Self::UnopenedCommitmentStored,
        Self::CommitmentProcessed,
        Self::FundsRetrieved,
        Self::FundsRewarded,
        Self::FundsSlashed,
    ];

    /// Contract that emits this event.
    #[must_use]
    pub const fn contract(self) -> Contract {
        match self {
            Self::NewL1Block => Contract::BlockTracker,
            Self::BidderRegistered
            | Self::BidderWithdrawal
            | Self::FundsRetrieved
            | Self::FundsRewarded => Contract::BidderRegistry,
            Self::OpenedCommitmentStored | Self::UnopenedCommitmentStored => {
                Contract::PreconfManager
            }
            Self::CommitmentProcessed => Contract::Oracle,
            Self::FundsSlashed => Contract::ProviderRegistry,
        }
    }

    /// Logical name of this event.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.definition().name
    }

    /// Static definition of this event at its default contract address.
    #[must_use]
    pub const fn definition(self) -> EventDefinition {
        let contract = self.contract().address();
        match self {
            Self::NewL1Block => EventDefinition::new(
                "NewL1Block",
                "NewL1Block(uint256 indexed blockNumber, address indexed winner, uint256 indexed window)",
                contract,
                &[
                    ("blockNumber", ColumnType::Int64),
                    ("window", ColumnType::Int64),
                ],
            ),
            Self::BidderRegistered => EventDefinition::new(
                "BidderRegistered",
                "BidderRegistered(address indexed bidder, uint256 depositedAmount, uint256 windowNumber)",
                contract,
                &[
                    ("depositedAmount", ColumnType::Float64),
                    ("windowNumber", ColumnType::Int64),
                ],
            ),
            Self::BidderWithdrawal => EventDefinition::new(
                "BidderWithdrawal",
                "BidderWithdrawal(address indexed bidder, uint256 window, uint256 amount)",
                contract,
                AMOUNT_AND_WINDOW,
            ),
            Self::OpenedCommitmentStored => EventDefinition::new(
                "OpenedCommitmentStored",
                "OpenedCommitmentStored(bytes32 indexed commitmentIndex, address bidder, address committer, \
                 uint256 bidAmt, uint64 blockNumber, bytes32 bidHash, uint64 decayStartTimeStamp, \
                 uint64 decayEndTimeStamp, string txnHash, string revertingTxHashes, bytes32 commitmentDigest, \
                 bytes bidSignature, bytes commitmentSignature, uint64 dispatchTimestamp, bytes sharedSecretKey)",
                contract,
                &[
                    ("bidAmt", ColumnType::Float64),
                    ("blockNumber", ColumnType::Int64),
                    ("decayStartTimeStamp", ColumnType::Int64),
                    ("decayEndTimeStamp", ColumnType::Int64),
                    ("dispatchTimestamp", ColumnType::Int64),
                ],
            ),
            Self::UnopenedCommitmentStored => EventDefinition::new(
                "UnopenedCommitmentStored",
                "UnopenedCommitmentStored(bytes32 indexed commitmentIndex, address committer, \
                 bytes32 commitmentDigest, bytes commitmentSignature, uint64 dispatchTimestamp)",
                contract,
                &[("dispatchTimestamp", ColumnType::Int64)],
            ),
            Self::CommitmentProcessed => EventDefinition::new(
                "CommitmentProcessed",
                "CommitmentProcessed(bytes32 indexed commitmentIndex, bool isSlash)",
                contract,
                &[],
            ),
            Self::FundsRetrieved => EventDefinition::new(
                "FundsRetrieved",
                "FundsRetrieved(bytes32 indexed commitmentDigest, address indexed bidder, uint256 window, uint256 amount)",
                contract,
                AMOUNT_AND_WINDOW,
            ),
            Self::FundsRewarded => EventDefinition::new(
                "FundsRewarded",
                "FundsRewarded(bytes32 indexed commitmentDigest, address indexed bidder, address indexed provider, \
                 uint256 window, uint256 amount)",
                contract,
                AMOUNT_AND_WINDOW,
            ),
            Self::FundsSlashed => EventDefinition::new(
                "FundsSlashed",
                "FundsSlashed(address indexed provider, uint256 amount)",
                contract,
                &[("amount", ColumnType::Float64)],
            ),
        }
    }

    /// Look up a built-in event by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().find(|k| k.name() == name).copied()
    }
}

/// A definition together with its parsed ABI and topic hash.
#[derive(Debug, Clone)]
pub struct RegisteredEvent {
    definition: EventDefinition,
    abi: Event,
    topic0: B256,
}

impl RegisteredEvent {
    /// The static definition.
    #[must_use]
    pub const fn definition(&self) -> &EventDefinition {
        &self.definition
    }

    /// The parsed ABI event.
    #[must_use]
    pub const fn abi(&self) -> &Event {
        &self.abi
    }

    /// `keccak256` of the canonical signature (the log's first topic).
    #[must_use]
    pub const fn topic0(&self) -> B256 {
        self.topic0
    }

    /// Canonical signature, e.g. `FundsSlashed(address,uint256)`.
    #[must_use]
    pub fn canonical_signature(&self) -> String {
        self.abi.signature()
    }
}

/// Immutable lookup table from event name, signature or topic to definition.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    entries: Vec<RegisteredEvent>,
    by_name: HashMap<&'static str, usize>,
    by_signature: HashMap<String, usize>,
    by_topic: HashMap<B256, usize>,
}

impl EventRegistry {
    /// Build a registry from `definitions`.
    ///
    /// # Errors
    ///
    /// Returns an error if a signature fails to parse, or if two definitions
    /// share a name or a canonical signature.
    pub fn new(
        definitions: impl IntoIterator<Item = EventDefinition>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            by_signature: HashMap::new(),
            by_topic: HashMap::new(),
        };

        for definition in definitions {
            let abi = definition.parse()?;
            let canonical = abi.signature();
            let topic0 = abi.selector();
            let idx = registry.entries.len();

            if registry.by_name.insert(definition.name, idx).is_some() {
                return Err(RegistryError::DuplicateEvent(definition.name.to_owned()));
            }
            if registry.by_signature.insert(canonical.clone(), idx).is_some() {
                return Err(RegistryError::DuplicateSignature(canonical));
            }
            registry.by_topic.insert(topic0, idx);
            registry.entries.push(RegisteredEvent {
                definition,
                abi,
                topic0,
            });
        }

        Ok(registry)
    }

    /// Registry of all built-in mev-commit events at their default addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in definition is malformed.
    pub fn mev_commit() -> Result<Self, RegistryError> {
        Self::mev_commit_with(&HashMap::new())
    }

    /// Registry of all built-in events, with some contracts relocated.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in definition is malformed.
    pub fn mev_commit_with(overrides: &HashMap<Contract, Address>) -> Result<Self, RegistryError> {
        Self::new(EventKind::ALL.iter().map(|kind| {
            let definition = kind.definition();
            overrides
                .get(&kind.contract())
                .map_or(definition, |address| definition.at(*address))
        }))
    }

    /// Look up an event by logical name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] if no event has this name.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredEvent, RegistryError> {
        self.by_name
            .get(name)
            .and_then(|idx| self.entries.get(*idx))
            .ok_or_else(|| RegistryError::UnknownEvent(name.to_owned()))
    }

    /// Look up an event by signature.
    ///
    /// Accepts the full declaration (with names and `indexed`) or the
    /// canonical form (`Name(type,type)`).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] if no event has this signature.
    pub fn lookup_by_signature(&self, signature: &str) -> Result<&RegisteredEvent, RegistryError> {
        let canonical = Event::parse(signature.trim())
            .map(|e| e.signature())
            .unwrap_or_else(|_| signature.trim().to_owned());
        self.by_signature
            .get(&canonical)
            .and_then(|idx| self.entries.get(*idx))
            .ok_or_else(|| RegistryError::UnknownEvent(signature.to_owned()))
    }

    /// Look up an event by its first log topic.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownEvent`] if no event has this topic.
    pub fn lookup_by_topic(&self, topic0: B256) -> Result<&RegisteredEvent, RegistryError> {
        self.by_topic
            .get(&topic0)
            .and_then(|idx| self.entries.get(*idx))
            .ok_or_else(|| RegistryError::UnknownEvent(format!("{topic0:#x}")))
    }

    /// Iterate over registered events in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEvent> {
        self.entries.iter()
    }

    /// Number of registered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, keccak256};

    use super::*;

    #[test]
    fn builtins_parse_and_register() {
        let registry = EventRegistry::mev_commit().expect("built-in definitions are valid");
        assert_eq!(registry.len(), EventKind::ALL.len(), "one entry per kind");

        for kind in EventKind::ALL {
            let event = registry.lookup(kind.name()).expect("registered by name");
            assert_eq!(
                event.definition().contract,
                kind.contract().address(),
                "{} contract",
                kind.name()
            );
            assert_eq!(EventKind::from_name(kind.name()), Some(*kind), "name round-trip");
        }
    }

    #[test]
    fn lookup_by_full_or_canonical_signature() {
        let registry = EventRegistry::mev_commit().expect("valid registry");

        let full = registry
            .lookup_by_signature("FundsSlashed(address indexed provider, uint256 amount)")
            .expect("full signature");
        let canonical = registry
            .lookup_by_signature("FundsSlashed(address,uint256)")
            .expect("canonical signature");

        assert_eq!(full.definition().name, "FundsSlashed", "full lookup");
        assert_eq!(canonical.definition().name, "FundsSlashed", "canonical lookup");
        assert_eq!(
            full.topic0(),
            keccak256("FundsSlashed(address,uint256)"),
            "topic0 is keccak of canonical signature"
        );
    }

    #[test]
    fn lookup_by_topic() {
        let registry = EventRegistry::mev_commit().expect("valid registry");
        let topic = keccak256("CommitmentProcessed(bytes32,bool)");
        let event = registry.lookup_by_topic(topic).expect("known topic");
        assert_eq!(event.definition().name, "CommitmentProcessed", "topic lookup");
    }

    #[test]
    fn unknown_event_is_an_error() {
        let registry = EventRegistry::mev_commit().expect("valid registry");
        assert!(
            matches!(registry.lookup("Deposit"), Err(RegistryError::UnknownEvent(n)) if n == "Deposit"),
            "unknown name"
        );
        assert!(
            matches!(
                registry.lookup_by_signature("Deposit(address,uint256)"),
                Err(RegistryError::UnknownEvent(_))
            ),
            "unknown signature"
        );
        assert!(
            matches!(registry.lookup_by_topic(B256::ZERO), Err(RegistryError::UnknownEvent(_))),
            "unknown topic"
        );
    }

    #[test]
    fn duplicate_signature_is_rejected() {
        let contract = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let a = EventDefinition::new("Deposit", "Deposit(address indexed who, uint256 amount)", contract, &[]);
        let b = EventDefinition::new("DepositAgain", "Deposit(address who, uint256 value)", contract, &[]);

        let err = EventRegistry::new([a, b]).expect_err("same canonical signature");
        assert!(
            matches!(&err, RegistryError::DuplicateSignature(s) if s == "Deposit(address,uint256)"),
            "{err}"
        );

        let err = EventRegistry::new([a, a]).expect_err("same name");
        assert!(matches!(err, RegistryError::DuplicateEvent(_)), "{err}");
    }

    #[test]
    fn invalid_signature_is_rejected() {
        let bad = EventDefinition::new("Broken", "Broken(uint256", Address::ZERO, &[]);
        let err = EventRegistry::new([bad]).expect_err("unbalanced parens");
        assert!(matches!(err, RegistryError::InvalidSignature { .. }), "{err}");
    }

    #[test]
    fn contract_overrides_relocate_events() {
        let relocated = address!("00000000000000000000000000000000000000bb");
        let overrides = HashMap::from([(Contract::BidderRegistry, relocated)]);
        let registry = EventRegistry::mev_commit_with(&overrides).expect("valid registry");

        assert_eq!(
            registry.lookup("BidderRegistered").expect("known").definition().contract,
            relocated,
            "overridden contract"
        );
        assert_eq!(
            registry.lookup("NewL1Block").expect("known").definition().contract,
            Contract::BlockTracker.address(),
            "untouched contract"
        );
    }
}
