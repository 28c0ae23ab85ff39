//! OrgToken Contract Client
//!
//! Thin wrapper over the ERC20-style `OrgToken` contract. Calls are sent by
//! the admin wallet in two steps: `send` broadcasts and returns the hash,
//! `confirm` waits for that hash to be mined.
//!
//! # Features
//! - User to user transfer, mint, admin burn
//! - On-chain admin set management
//! - Decimal → 18-decimal token unit conversion

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::contract::{abigen, ContractCall};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TxHash, U256, U64};
use ethers::utils::parse_units;
use thiserror::Error;

use crate::config::ChainConfig;

abigen!(
    OrgToken,
    r#"[
        function transferFromUserToUser(address from, address to, uint256 amount) external
        function mintTo(address to, uint256 amount) external
        function adminBurn(address from, uint256 amount) external
        function addAdmin(address account) external
        function removeAdmin(address account) external
    ]"#
);

/// 토큰 소수 자릿수 (ERC20 표준)
pub const TOKEN_DECIMALS: u32 = 18;

/// 컨트랙트 호출 에러
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain client is not configured")]
    NotConfigured,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid token amount: {0}")]
    InvalidAmount(String),

    #[error("invalid transaction hash: {0}")]
    InvalidHash(String),

    #[error("transaction submission failed: {0}")]
    Submission(String),

    #[error("receipt lookup failed: {0}")]
    Receipt(String),

    #[error("transaction {0} reverted")]
    Reverted(String),

    #[error("transaction dropped before confirmation")]
    Dropped,

    #[error("contract call timed out after {0}s")]
    Timeout(u64),
}

impl ChainError {
    /// 재시도해도 결과가 바뀌지 않는 에러인지
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ChainError::InvalidAddress(_) | ChainError::InvalidAmount(_) | ChainError::Reverted(_)
        )
    }

    /// 전송된 해시가 더 이상 확정될 수 없어 다시 전송해야 하는지
    pub fn voids_broadcast(&self) -> bool {
        matches!(
            self,
            ChainError::Reverted(_) | ChainError::Dropped | ChainError::InvalidHash(_)
        )
    }
}

/// 10진수 금액 문자열 → 토큰 최소 단위 (parseUnits(amount, 18))
pub fn to_token_units(amount: &str) -> Result<U256, ChainError> {
    parse_units(amount, TOKEN_DECIMALS)
        .map(U256::from)
        .map_err(|e| ChainError::InvalidAmount(format!("{amount}: {e}")))
}

pub fn parse_address(address: &str) -> Result<Address, ChainError> {
    address
        .parse::<Address>()
        .map_err(|_| ChainError::InvalidAddress(address.to_string()))
}

/// OrgToken 컨트랙트 인터페이스
///
/// 쓰기 메서드는 트랜잭션을 전송만 하고 해시(0x hex)를 반환.
/// 같은 해시로 `confirm`을 여러 번 호출해도 재전송은 일어나지 않음
#[async_trait]
pub trait TokenContract: Send + Sync {
    async fn transfer_from_user_to_user(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<String, ChainError>;

    async fn mint_to(&self, to: Address, amount: U256) -> Result<String, ChainError>;

    async fn admin_burn(&self, from: Address, amount: U256) -> Result<String, ChainError>;

    async fn add_admin(&self, account: Address) -> Result<String, ChainError>;

    async fn remove_admin(&self, account: Address) -> Result<String, ChainError>;

    /// 전송된 트랜잭션이 확정될 때까지 대기. revert면 `Reverted`, 노드에서 사라졌으면 `Dropped`
    async fn confirm(&self, tx_hash: &str) -> Result<String, ChainError>;
}

type AdminClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// ethers 기반 OrgToken 클라이언트
pub struct OrgTokenClient {
    contract: OrgToken<AdminClient>,
    provider: Provider<Http>,
    confirmations: usize,
}

impl OrgTokenClient {
    /// RPC provider + 관리자 지갑으로 클라이언트 생성
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let contract_address = config
            .contract_address
            .as_deref()
            .context("CONTRACT_ADDRESS is not set")?;
        let private_key = config
            .admin_private_key
            .as_deref()
            .context("ADMIN_PRIVATE_KEY is not set")?;

        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .with_context(|| format!("Invalid RPC URL '{}'", config.rpc_url))?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .context("ADMIN_PRIVATE_KEY is not a valid private key")?
            .with_chain_id(config.chain_id);
        let address = contract_address
            .parse::<Address>()
            .context("CONTRACT_ADDRESS is not a valid address")?;

        tracing::info!(
            rpc_url = %config.rpc_url,
            chain_id = config.chain_id,
            contract = %contract_address,
            admin = ?wallet.address(),
            "OrgToken client initialized"
        );

        let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        Ok(Self {
            contract: OrgToken::new(address, client),
            provider,
            confirmations: config.confirmations,
        })
    }

    /// 트랜잭션 전송. mempool에 들어가면 바로 해시 반환
    async fn send(&self, call: ContractCall<AdminClient, ()>) -> Result<String, ChainError> {
        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::Submission(e.to_string()))?;
        Ok(format!("{:#x}", *pending))
    }
}

#[async_trait]
impl TokenContract for OrgTokenClient {
    async fn transfer_from_user_to_user(
        &self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<String, ChainError> {
        self.send(self.contract.transfer_from_user_to_user(from, to, amount))
            .await
    }

    async fn mint_to(&self, to: Address, amount: U256) -> Result<String, ChainError> {
        self.send(self.contract.mint_to(to, amount)).await
    }

    async fn admin_burn(&self, from: Address, amount: U256) -> Result<String, ChainError> {
        self.send(self.contract.admin_burn(from, amount)).await
    }

    async fn add_admin(&self, account: Address) -> Result<String, ChainError> {
        self.send(self.contract.add_admin(account)).await
    }

    async fn remove_admin(&self, account: Address) -> Result<String, ChainError> {
        self.send(self.contract.remove_admin(account)).await
    }

    async fn confirm(&self, tx_hash: &str) -> Result<String, ChainError> {
        let hash = tx_hash
            .parse::<TxHash>()
            .map_err(|_| ChainError::InvalidHash(tx_hash.to_string()))?;

        let receipt = PendingTransaction::new(hash, &self.provider)
            .confirmations(self.confirmations)
            .await
            .map_err(|e| ChainError::Receipt(e.to_string()))?
            .ok_or(ChainError::Dropped)?;

        if receipt.status == Some(U64::zero()) {
            return Err(ChainError::Reverted(tx_hash.to_string()));
        }
        Ok(format!("{:#x}", receipt.transaction_hash))
    }
}

/// RPC 설정이 없을 때 사용. 모든 호출이 `NotConfigured`
pub struct UnconfiguredContract;

#[async_trait]
impl TokenContract for UnconfiguredContract {
    async fn transfer_from_user_to_user(
        &self,
        _from: Address,
        _to: Address,
        _amount: U256,
    ) -> Result<String, ChainError> {
        Err(ChainError::NotConfigured)
    }

    async fn mint_to(&self, _to: Address, _amount: U256) -> Result<String, ChainError> {
        Err(ChainError::NotConfigured)
    }

    async fn admin_burn(&self, _from: Address, _amount: U256) -> Result<String, ChainError> {
        Err(ChainError::NotConfigured)
    }

    async fn add_admin(&self, _account: Address) -> Result<String, ChainError> {
        Err(ChainError::NotConfigured)
    }

    async fn remove_admin(&self, _account: Address) -> Result<String, ChainError> {
        Err(ChainError::NotConfigured)
    }

    async fn confirm(&self, _tx_hash: &str) -> Result<String, ChainError> {
        Err(ChainError::NotConfigured)
    }
}

/// 설정에 따라 실제 클라이언트 또는 비활성 클라이언트 생성
pub fn from_config(config: &ChainConfig) -> Result<Arc<dyn TokenContract>> {
    if config.is_configured() {
        Ok(Arc::new(OrgTokenClient::new(config)?))
    } else {
        tracing::warn!("CONTRACT_ADDRESS / ADMIN_PRIVATE_KEY not set, chain mirroring disabled");
        Ok(Arc::new(UnconfiguredContract))
    }
}

// 테스트용 Mock 구현:


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_token_units_scales_by_18_decimals() {
        let units = to_token_units("40.00").unwrap();
        assert_eq!(units, U256::from(40u64) * U256::exp10(18));

        let cents = to_token_units("0.01").unwrap();
        assert_eq!(cents, U256::exp10(16));
    }

    #[test]
    fn test_to_token_units_rejects_garbage() {
        assert!(matches!(to_token_units("abc"), Err(ChainError::InvalidAmount(_))));
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x1234567890123456789012345678901234567890").is_ok());
        assert!(matches!(parse_address("0x12"), Err(ChainError::InvalidAddress(_))));
    }

    #[test]
    fn test_permanent_errors() {
        assert!(ChainError::InvalidAddress("x".into()).is_permanent());
        assert!(ChainError::Reverted("0xab".into()).is_permanent());
        assert!(!ChainError::Timeout(5).is_permanent());
        assert!(!ChainError::NotConfigured.is_permanent());
        assert!(!ChainError::Receipt("connection reset".into()).is_permanent());
    }

    #[test]
    fn test_broadcast_is_kept_unless_voided() {
        assert!(ChainError::Dropped.voids_broadcast());
        assert!(ChainError::Reverted("0xab".into()).voids_broadcast());
        assert!(!ChainError::Timeout(5).voids_broadcast());
        assert!(!ChainError::Receipt("connection reset".into()).voids_broadcast());
    }

    #[tokio::test]
    async fn test_unconfigured_contract_refuses_calls() {
        let contract = UnconfiguredContract;
        let result = contract.add_admin(Address::zero()).await;
        assert!(matches!(result, Err(ChainError::NotConfigured)));
    }
}
