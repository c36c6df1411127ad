//! Ledger facade: blocks and entity state behind one handle.

use chain_ledger_types::{
    Block, BlockNum, Document, IndexValue, Result, config::LedgerConfig,
    error::InvalidArgumentSnafu,
};
use snafu::OptionExt;
use tracing::warn;

use crate::{
    block_ledger::{BlockInsert, BlockLedger},
    engine::StorageEngine,
    registry::{EntityBinding, TableRegistry},
    temporal::{AddVersion, TemporalStore},
};

/// Entry point for callers that submit blocks and entity state.
///
/// Holds the storage engine handle explicitly; clones share it.
#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: BlockLedger,
    state: TemporalStore,
    registry: TableRegistry,
}

impl Ledger {
    /// Creates a ledger over a connected engine.
    ///
    /// Forks roll back the registry's tables in registry order.
    pub fn new(engine: StorageEngine, registry: TableRegistry) -> Self {
        let blocks = BlockLedger::new(engine.clone(), registry.table_names());
        let state = TemporalStore::new(engine);
        Self { blocks, state, registry }
    }

    /// Connects to the store named by `config` and builds its registry.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Configuration`] if the configuration is invalid,
    /// or [`LedgerError::Transport`] if the store never became ready.
    ///
    /// [`LedgerError::Configuration`]: chain_ledger_types::LedgerError::Configuration
    /// [`LedgerError::Transport`]: chain_ledger_types::LedgerError::Transport
    pub fn connect(config: &LedgerConfig) -> Result<Self> {
        let registry = TableRegistry::from_config(config)?;
        if registry.is_empty() {
            warn!("No state tables configured; forks only rewrite the blocks table");
        }
        let engine = StorageEngine::connect(&config.storage.path, &config.connect)?;
        Ok(Self::new(engine, registry))
    }

    /// Records `block` as canonical for its height. See [`BlockLedger::insert`].
    pub fn insert_block(&self, block: Block) -> Result<BlockInsert> {
        self.blocks.insert(block)
    }

    /// Adds a state version for an entity type at `block_num`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownEntityType`] if no table is configured for `entity_type`
    /// - [`LedgerError::InvalidArgument`] if the payload lacks the index field
    /// - any error of [`TemporalStore::add_version`]
    ///
    /// [`LedgerError::UnknownEntityType`]: chain_ledger_types::LedgerError::UnknownEntityType
    /// [`LedgerError::InvalidArgument`]: chain_ledger_types::LedgerError::InvalidArgument
    pub fn add_entity_state(
        &self,
        entity_type: &str,
        payload: Document,
        block_num: BlockNum,
    ) -> Result<AddVersion> {
        let binding = self.registry.resolve(entity_type)?;
        self.add_with_binding(binding, payload, block_num)
    }

    /// Adds a state version using a binding resolved earlier with [`Ledger::binding`].
    pub fn add_with_binding(
        &self,
        binding: &EntityBinding,
        payload: Document,
        block_num: BlockNum,
    ) -> Result<AddVersion> {
        let index_value = IndexValue::from_document(&payload, binding.index()).context(
            InvalidArgumentSnafu {
                message: format!(
                    "{} payload is missing index field \"{}\"",
                    binding.entity_type(),
                    binding.index()
                ),
            },
        )?;
        self.state.add_version(binding.table(), binding.index(), &index_value, payload, block_num)
    }

    /// Resolves an entity type once for repeated [`Ledger::add_with_binding`] calls.
    pub fn binding(&self, entity_type: &str) -> Result<&EntityBinding> {
        self.registry.resolve(entity_type)
    }

    /// Block storage.
    pub fn blocks(&self) -> &BlockLedger {
        &self.blocks
    }

    /// Versioned state tables.
    pub fn state(&self) -> &TemporalStore {
        &self.state
    }

    /// Entity bindings.
    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }
}
