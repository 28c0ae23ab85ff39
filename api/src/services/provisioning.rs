//! Startup provisioning of the built-in admin account.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db::{NewUser, Repository, User};
use crate::types::EthAddress;

pub const ADMIN_USERNAME: &str = "admin";

/// `admin` 계정과 체인 주소가 없으면 생성
///
/// - ADMIN_PASSWORD_HASH 없으면 계정 생성 생략
/// - ADMIN_BLOCKCHAIN_ADDRESS 없으면 주소 연결 생략
pub async fn ensure_admin(repo: &dyn Repository, config: &Config) -> Result<Option<User>> {
    let admin = match repo.find_user_by_username(ADMIN_USERNAME).await? {
        Some(admin) => admin,
        None => {
            let Some(password_hash) = config.admin_password_hash.clone() else {
                tracing::warn!("ADMIN_PASSWORD_HASH is not set, skipping admin bootstrap");
                return Ok(None);
            };
            let admin = repo
                .create_user(NewUser {
                    username: ADMIN_USERNAME.to_string(),
                    password_hash,
                    email: "admin@university.edu".to_string(),
                    full_name: "System Administrator".to_string(),
                    department: "IT".to_string(),
                    is_admin: true,
                })
                .await
                .context("failed to create admin user")?;
            tracing::info!(user_id = admin.id, "admin user created");
            admin
        }
    };

    if repo.blockchain_address(admin.id).await?.is_none() {
        match config.admin_blockchain_address.as_deref() {
            Some(raw) => {
                let address = EthAddress::new(raw)
                    .map_err(|e| anyhow::anyhow!("ADMIN_BLOCKCHAIN_ADDRESS: {e}"))?;
                repo.upsert_blockchain_address(admin.id, address.as_str())
                    .await?;
                tracing::info!(user_id = admin.id, address = %address, "admin blockchain address assigned");
            }
            None => tracing::error!("ADMIN_BLOCKCHAIN_ADDRESS is not set in the environment variables"),
        }
    }

    Ok(Some(admin))
}
