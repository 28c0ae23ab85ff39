//! Chain Mirror Worker
//!
//! Drains the `chain_jobs` outbox and replays each committed ledger event on
//! the OrgToken contract.
//!
//! # Job lifecycle
//!
//! ```text
//! pending ──claim──▶ in_flight ──ok──▶ mirrored
//!    ▲                  │
//!    └──retryable err───┤
//!                       └──permanent err / attempts exhausted──▶ failed
//! ```
//!
//! - 원장 커밋과 같은 DB 트랜잭션에서 job이 생성되므로 HTTP 응답 이후 프로세스가
//!   죽어도 job은 남아 있음
//! - 전송 직후 tx hash를 job에 기록. 재시도는 그 hash의 receipt만 확인하므로
//!   같은 원장 이벤트가 체인에 두 번 반영되지 않음
//! - 시작 시, 그리고 poll마다 오래된 in_flight job을 pending으로 되돌림
//! - 전송과 확정 대기에 각각 timeout 적용

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{watch, Notify};
use tokio::time::timeout;

use crate::config::MirrorConfig;
use crate::db::{ChainJob, JobKind, Repository};
use crate::services::contract::{parse_address, to_token_units, ChainError, TokenContract};

/// 원장 서비스가 worker를 깨우는 핸들
#[derive(Clone)]
pub struct MirrorHandle {
    notify: Arc<Notify>,
}

impl MirrorHandle {
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// worker 없이 사용하는 핸들 (테스트, 체인 비활성 상태)
    pub fn detached() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }
}

/// 단일 job 실행 실패
#[derive(Debug, thiserror::Error)]
pub enum MirrorFailure {
    #[error("user {0} has no blockchain address")]
    MissingBlockchainAddress(i32),

    #[error("job {0} has no amount")]
    MissingAmount(i64),

    #[error("transfer job {0} has no receiver")]
    MissingCounterparty(i64),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl MirrorFailure {
    /// 재시도 없이 바로 failed 처리할 에러
    pub fn is_permanent(&self) -> bool {
        match self {
            MirrorFailure::MissingBlockchainAddress(_)
            | MirrorFailure::MissingAmount(_)
            | MirrorFailure::MissingCounterparty(_) => true,
            MirrorFailure::Chain(e) => e.is_permanent(),
            MirrorFailure::Storage(_) => false,
        }
    }
}

impl From<anyhow::Error> for MirrorFailure {
    fn from(err: anyhow::Error) -> Self {
        MirrorFailure::Storage(err.to_string())
    }
}

/// Exponential backoff with jitter (0 ~ 10%)
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// 체인 미러링 worker
pub struct MirrorWorker {
    repo: Arc<dyn Repository>,
    contract: Arc<dyn TokenContract>,
    config: MirrorConfig,
    notify: Arc<Notify>,
}

impl MirrorWorker {
    pub fn new(
        repo: Arc<dyn Repository>,
        contract: Arc<dyn TokenContract>,
        config: MirrorConfig,
    ) -> (Self, MirrorHandle) {
        let notify = Arc::new(Notify::new());
        let handle = MirrorHandle {
            notify: notify.clone(),
        };
        (
            Self {
                repo,
                contract,
                config,
                notify,
            },
            handle,
        )
    }

    /// worker 루프. shutdown 신호를 받으면 현재 배치를 마치고 종료
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // 이전 프로세스가 남긴 in_flight job은 나이와 무관하게 회수
        self.requeue_stale(Utc::now()).await;

        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_attempts = self.config.max_attempts,
            "chain mirror worker started"
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let stale_after =
            chrono::Duration::from_std(self.config.stale_after()).unwrap_or_else(|_| chrono::Duration::zero());
        loop {
            if let Err(e) = self.drain().await {
                tracing::error!(error = %e, "error draining chain jobs");
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("chain mirror worker stopping");
                    return;
                }
            }

            // 다른 인스턴스가 claim한 채 죽은 job 회수
            self.requeue_stale(Utc::now() - stale_after).await;
        }
    }

    async fn requeue_stale(&self, older_than: chrono::DateTime<Utc>) {
        match self.repo.requeue_in_flight_jobs(older_than).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(jobs = n, "requeued stale in-flight jobs"),
            Err(e) => tracing::error!(error = %e, "failed to requeue in-flight jobs"),
        }
    }

    /// 실행 가능한 job을 모두 처리. 결과가 기록된 job 수 반환
    ///
    /// 결과 기록에 실패한 job은 pending으로 되돌리고 다음 drain에서 다시 처리
    pub async fn drain(&self) -> Result<usize> {
        let mut processed = 0;
        loop {
            let jobs = self
                .repo
                .claim_due_jobs(Utc::now(), self.config.batch_size)
                .await?;
            if jobs.is_empty() {
                return Ok(processed);
            }

            let mut storage_failed = false;
            for job in jobs {
                match self.process(&job).await {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        storage_failed = true;
                        tracing::error!(job_id = job.id, error = %e, "failed to record job outcome");
                        self.release(&job).await;
                    }
                }
            }
            if storage_failed {
                return Ok(processed);
            }
        }
    }

    async fn release(&self, job: &ChainJob) {
        let delay = calculate_backoff(
            job.attempts as u32 + 1,
            self.config.backoff_base_ms,
            self.config.backoff_max_ms,
        );
        let next_attempt_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        if let Err(e) = self.repo.release_job(job, next_attempt_at).await {
            // stale requeue가 나중에 회수
            tracing::error!(job_id = job.id, error = %e, "failed to release job");
        }
    }

    async fn process(&self, job: &ChainJob) -> Result<()> {
        match self.execute(job).await {
            Ok(tx_hash) => {
                tracing::info!(
                    job_id = job.id,
                    kind = %job.kind,
                    transaction_id = ?job.transaction_id,
                    tx_hash = %tx_hash,
                    "ledger event mirrored on-chain"
                );
                self.repo.complete_job(job, &tx_hash).await
            }
            Err(failure) => {
                let attempt = job.attempts as u32 + 1;
                let message = failure.to_string();

                if failure.is_permanent() || attempt >= self.config.max_attempts {
                    tracing::error!(
                        job_id = job.id,
                        kind = %job.kind,
                        transaction_id = ?job.transaction_id,
                        attempt,
                        error = %message,
                        "chain mirror failed permanently"
                    );
                    return self.repo.fail_job(job, &message).await;
                }

                let delay = calculate_backoff(
                    attempt,
                    self.config.backoff_base_ms,
                    self.config.backoff_max_ms,
                );
                let next_attempt_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                tracing::warn!(
                    job_id = job.id,
                    kind = %job.kind,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %message,
                    "chain mirror attempt failed, rescheduling"
                );
                self.repo.reschedule_job(job, &message, next_attempt_at).await
            }
        }
    }

    /// 전송(해시가 없을 때만) → 해시 기록 → 확정 대기
    ///
    /// 해시가 기록된 job은 재시도 시 같은 트랜잭션의 receipt만 확인함.
    /// revert나 drop으로 해시가 무효가 되면 지워서 다음 시도에서 다시 전송
    async fn execute(&self, job: &ChainJob) -> Result<String, MirrorFailure> {
        let tx_hash = match &job.tx_hash {
            Some(hash) => {
                tracing::debug!(job_id = job.id, tx_hash = %hash, "job already broadcast, awaiting receipt");
                hash.clone()
            }
            None => {
                let hash = self.with_timeout(self.broadcast(job)).await?;
                if let Err(e) = self.repo.set_job_tx_hash(job.id, Some(&hash)).await {
                    tracing::error!(job_id = job.id, tx_hash = %hash, error = %e, "failed to record broadcast hash");
                    return Err(e.into());
                }
                hash
            }
        };

        let confirmed = self
            .with_timeout(async { self.contract.confirm(&tx_hash).await.map_err(MirrorFailure::from) })
            .await;
        if let Err(MirrorFailure::Chain(e)) = &confirmed {
            if e.voids_broadcast() {
                self.repo.set_job_tx_hash(job.id, None).await?;
            }
        }
        confirmed
    }

    async fn broadcast(&self, job: &ChainJob) -> Result<String, MirrorFailure> {
        let user = self.address_of(job.user_id).await?;
        let tx_hash = match job.kind {
            JobKind::Transfer => {
                let receiver_id = job
                    .counterparty_id
                    .ok_or(MirrorFailure::MissingCounterparty(job.id))?;
                let receiver = self.address_of(receiver_id).await?;
                let amount = to_token_units(self.amount_of(job)?)?;
                self.contract
                    .transfer_from_user_to_user(user, receiver, amount)
                    .await?
            }
            JobKind::Burn => {
                let amount = to_token_units(self.amount_of(job)?)?;
                self.contract.admin_burn(user, amount).await?
            }
            JobKind::Mint => {
                let amount = to_token_units(self.amount_of(job)?)?;
                self.contract.mint_to(user, amount).await?
            }
            JobKind::AddAdmin => self.contract.add_admin(user).await?,
            JobKind::RemoveAdmin => self.contract.remove_admin(user).await?,
        };
        Ok(tx_hash)
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, MirrorFailure>>,
    ) -> Result<T, MirrorFailure> {
        let limit = self.config.call_timeout_secs;
        timeout(Duration::from_secs(limit), call)
            .await
            .map_err(|_| MirrorFailure::Chain(ChainError::Timeout(limit)))?
    }

    async fn address_of(&self, user_id: i32) -> Result<ethers::types::Address, MirrorFailure> {
        let record = self
            .repo
            .blockchain_address(user_id)
            .await?
            .ok_or(MirrorFailure::MissingBlockchainAddress(user_id))?;
        Ok(parse_address(&record.block_address)?)
    }

    fn amount_of<'a>(&self, job: &'a ChainJob) -> Result<&'a str, MirrorFailure> {
        job.amount
            .as_deref()
            .ok_or(MirrorFailure::MissingAmount(job.id))
    }
}
