//! Simulation orchestration.
//!
//! A simulation runs the request for real on the node, between a snapshot and its revert:
//!
//! 1. wait for exclusive use of the node connection,
//! 2. create a snapshot (nothing to undo if this fails),
//! 3. estimate gas, execute, wait for the receipt and fetch the transaction,
//! 4. reconstruct transfers from the transaction value, the receipt logs and, depending on the
//!    strategy, a trace,
//! 5. revert the snapshot, whatever happened in 3 and 4.
//!
//! Per-log and per-trace-record problems are skipped inside the decoders. Failures of a stage
//! abort the run and surface as a single [`SimulationError`].
use std::{future::Future, sync::Arc, time::Duration};

use alloy_primitives::Address;
use strum_macros::Display;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::SimulatorConfig,
    errors::SimulationError,
    evm::{
        gateway::RpcGateway,
        logs::LogAnalyzer,
        node::{BoxedProvider, NodeClient, NodeConnection, RpcNode},
        snapshot::SnapshotManager,
        token::TokenMetadataReader,
        traces::TraceScope,
    },
    models::{SimulationRequest, SimulationResult, TraceFallback, TraceStrategy, TransferRecord},
};

/// Per-run controls.
#[derive(Debug, Clone, Default)]
pub struct SimulationOptions {
    /// Aborts the run when cancelled. The snapshot is still reverted.
    pub cancel: Option<CancellationToken>,
    /// Upper bound on the whole run, including the wait for the node connection.
    pub deadline: Option<Duration>,
    /// Overrides the configured behaviour for a missing tracer.
    pub fallback: Option<TraceFallback>,
}

impl SimulationOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_fallback(mut self, fallback: TraceFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
enum Stage {
    Queue,
    Impersonation,
    GasEstimation,
    Execution,
    Receipt,
    Transaction,
    LogAnalysis,
    Tracing,
}

/// Races pipeline stages against the caller's cancellation token and deadline.
struct StageGuard<'a> {
    cancel: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
}

impl StageGuard<'_> {
    fn check(&self, stage: Stage) -> Result<(), SimulationError> {
        if self
            .cancel
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(SimulationError::Cancelled(format!("cancelled before {stage}")));
        }
        if self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            return Err(SimulationError::Cancelled(format!("deadline elapsed before {stage}")));
        }
        Ok(())
    }

    /// Checks for cancellation at the stage boundary only. Stages that change node state are
    /// awaited to completion, so the revert always lands after them.
    fn enter(&self, stage: Stage) -> Result<(), SimulationError> {
        self.check(stage)?;
        debug!(%stage, "Entering stage");
        Ok(())
    }

    /// Runs a read-only stage, aborting it as soon as the run is cancelled or its deadline
    /// elapses.
    async fn run<T, F>(&self, stage: Stage, fut: F) -> Result<T, SimulationError>
    where
        F: Future<Output = Result<T, SimulationError>>,
    {
        self.enter(stage)?;

        let cancelled = async {
            match self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(SimulationError::Cancelled(format!("cancelled during {stage}"))),
            _ = expired => {
                Err(SimulationError::Cancelled(format!("deadline elapsed during {stage}")))
            }
            result = fut => result,
        }
    }
}

/// Runs transaction simulations against one node.
pub struct Simulator<N> {
    connection: Arc<NodeConnection<N>>,
    gateway: RpcGateway<N>,
    snapshots: SnapshotManager<N>,
    tokens: TokenMetadataReader,
    config: SimulatorConfig,
}

impl Simulator<RpcNode<BoxedProvider>> {
    /// Connects to the node at `config.rpc_url`.
    pub async fn connect(config: SimulatorConfig) -> Result<Self, SimulationError> {
        let node = RpcNode::connect(&config.rpc_url).await?;
        Ok(Self::new(node, config))
    }
}

impl<N: NodeClient> Simulator<N> {
    pub fn new(client: N, config: SimulatorConfig) -> Self {
        Self::with_connection(Arc::new(NodeConnection::new(client)), config)
    }

    /// Builds a simulator on a connection that may be shared with other simulators. Runs on the
    /// same connection are serialized.
    pub fn with_connection(connection: Arc<NodeConnection<N>>, config: SimulatorConfig) -> Self {
        Self {
            gateway: RpcGateway::new(connection.clone(), &config),
            snapshots: SnapshotManager::new(connection.clone()),
            tokens: TokenMetadataReader::new(&config),
            connection,
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<NodeConnection<N>> {
        &self.connection
    }

    pub fn gateway(&self) -> &RpcGateway<N> {
        &self.gateway
    }

    /// Receipt and logs only.
    pub async fn simulate_basic(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResult, SimulationError> {
        self.simulate(request, TraceStrategy::ReceiptOnly)
            .await
    }

    /// Adds internal transfers from `trace_transaction`.
    pub async fn simulate_with_trace(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResult, SimulationError> {
        self.simulate(request, TraceStrategy::FlatTrace)
            .await
    }

    /// Adds internal transfers from `debug_traceTransaction` with the call tracer.
    pub async fn simulate_with_debug_trace(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResult, SimulationError> {
        self.simulate(request, TraceStrategy::CallTree)
            .await
    }

    pub async fn simulate(
        &self,
        request: &SimulationRequest,
        strategy: TraceStrategy,
    ) -> Result<SimulationResult, SimulationError> {
        self.simulate_with_options(request, strategy, &SimulationOptions::default())
            .await
    }

    /// Simulate a transaction
    ///
    /// The node's state after this call equals its state before it, whether the simulation
    /// succeeds or not, unless the final revert itself fails (which is logged).
    ///
    /// # Arguments
    ///
    /// * `request` - The transaction to simulate. Its sender must be unlocked on the node, or
    ///   `impersonate_sender` must be enabled.
    /// * `strategy` - How internal native transfers are reconstructed
    /// * `options` - Cancellation, deadline and tracer fallback for this run
    #[instrument(skip_all, fields(from = %request.from, %strategy))]
    pub async fn simulate_with_options(
        &self,
        request: &SimulationRequest,
        strategy: TraceStrategy,
        options: &SimulationOptions,
    ) -> Result<SimulationResult, SimulationError> {
        let guard = StageGuard {
            cancel: options.cancel.as_ref(),
            deadline: options
                .deadline
                .map(|deadline| Instant::now() + deadline),
        };
        let fallback = options
            .fallback
            .unwrap_or(self.config.fallback);

        let _lane = guard
            .run(Stage::Queue, async { Ok(self.connection.acquire().await) })
            .await?;

        // Snapshot creation is never raced: an id lost in flight could not be reverted.
        let result = self
            .snapshots
            .with_snapshot(|| self.run_isolated(request, strategy, fallback, &guard))
            .await;

        match &result {
            Ok(result) => info!(
                transfers = result.transfers.len(),
                gas_used = result.gas_used,
                "Simulation succeeded"
            ),
            Err(err) => warn!(%err, kind = %err.kind(), "Simulation failed"),
        }
        result
    }

    /// Fetches the `Transfer` logs of a block range and decodes them like receipt logs.
    pub async fn scan_transfers(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferRecord>, SimulationError> {
        let logs = self
            .gateway
            .get_transfer_logs(from_block, to_block)
            .await?;
        debug!(logs = logs.len(), from_block, to_block, "Transfer logs fetched");
        Ok(LogAnalyzer::new(&self.gateway, &self.tokens)
            .analyze(&logs)
            .await)
    }

    async fn run_isolated(
        &self,
        request: &SimulationRequest,
        strategy: TraceStrategy,
        fallback: TraceFallback,
        guard: &StageGuard<'_>,
    ) -> Result<SimulationResult, SimulationError> {
        if !self.config.impersonate_sender {
            return self
                .execute(request, strategy, fallback, guard)
                .await;
        }

        guard.enter(Stage::Impersonation)?;
        // Impersonation survives `evm_revert`: undo it once attempted.
        let result = match self
            .gateway
            .impersonate(request.from)
            .await
        {
            Ok(()) => {
                self.execute(request, strategy, fallback, guard)
                    .await
            }
            Err(err) => Err(err),
        };
        self.stop_impersonating(request.from)
            .await;
        result
    }

    async fn stop_impersonating(&self, account: Address) {
        if let Err(err) = self
            .gateway
            .stop_impersonating(account)
            .await
        {
            warn!(%account, %err, "Failed to stop impersonating sender");
        }
    }

    async fn execute(
        &self,
        request: &SimulationRequest,
        strategy: TraceStrategy,
        fallback: TraceFallback,
        guard: &StageGuard<'_>,
    ) -> Result<SimulationResult, SimulationError> {
        let estimated_gas = if self.config.estimate_gas {
            let gas = guard
                .run(Stage::GasEstimation, self.gateway.estimate_gas(request))
                .await?;
            info!(gas, "Estimated gas");
            Some(gas)
        } else {
            None
        };

        guard.enter(Stage::Execution)?;
        let tx_hash = self
            .gateway
            .send_transaction(request, request.gas.or(estimated_gas))
            .await?;
        info!(%tx_hash, "Transaction executed");

        let receipt = guard
            .run(Stage::Receipt, self.gateway.wait_for_receipt(tx_hash))
            .await?;
        info!(gas_used = receipt.gas_used, logs = receipt.logs.len(), "Receipt received");

        let transaction = guard
            .run(Stage::Transaction, self.gateway.get_transaction(tx_hash))
            .await?;
        debug!(
            value = %transaction.value,
            gas_price = ?transaction.gas_price,
            "Transaction fetched"
        );

        // Discovery order: transaction value, token logs, then internal calls.
        let mut transfers: Vec<TransferRecord> = transaction
            .value_transfer()
            .into_iter()
            .map(TransferRecord::from)
            .collect();

        let analyzer = LogAnalyzer::new(&self.gateway, &self.tokens);
        let token_transfers = guard
            .run(Stage::LogAnalysis, async { Ok(analyzer.analyze(&receipt.logs).await) })
            .await?;
        transfers.extend(token_transfers);

        let (internal, strategy) = match guard
            .run(Stage::Tracing, self.gateway.fetch_trace(tx_hash, strategy))
            .await
        {
            // The top-level call is already covered by the transaction value.
            Ok(trace) => (
                trace
                    .map(|trace| trace.native_transfers(TraceScope::InternalOnly))
                    .unwrap_or_default(),
                strategy,
            ),
            Err(err @ SimulationError::TracingUnsupported { .. })
                if fallback == TraceFallback::ReceiptOnly =>
            {
                warn!(%err, "Tracer unavailable, keeping receipt-derived transfers only");
                (Vec::new(), TraceStrategy::ReceiptOnly)
            }
            Err(err) => return Err(err),
        };
        debug!(internal = internal.len(), "Internal transfers decoded");
        transfers.extend(
            internal
                .into_iter()
                .map(TransferRecord::from),
        );

        Ok(SimulationResult {
            tx_hash,
            transfers,
            gas_used: receipt.gas_used,
            estimated_gas,
            strategy,
        })
    }
}
