//! secbridge 자격증명 크레이트
//!
//! 런타임에 활성화된 클라우드를 감지하고, 해당 클라우드의 비밀 저장소에서
//! 벤더 API 자격증명을 읽어옵니다.
//!
//! # 구성
//!
//! - [`context`]: 배포 마커 기반 [`CloudContext`] 감지
//! - [`store`]: [`SecretStore`] trait과 AWS / Azure / GCP 백엔드
//! - [`broker`]: 벤더별 메모리 캐시를 가진 [`CredentialBroker`]
//! - [`sigv4`]: AWS Signature Version 4 서명
//!
//! # 사용 예시
//!
//! ```no_run
//! # async fn example() -> Result<(), secbridge_core::BridgeError> {
//! use secbridge_core::{BridgeConfig, Vendor};
//! use secbridge_credentials::{CredentialBroker, Environment};
//!
//! let config = BridgeConfig::default();
//! let broker = CredentialBroker::from_environment(
//!     &config,
//!     &Environment::capture(),
//!     reqwest::Client::new(),
//! )?;
//! let credential = broker.resolve(Vendor::CrowdStrike).await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod context;
pub mod error;
pub mod sigv4;
pub mod store;

pub use broker::CredentialBroker;
pub use context::{CloudContext, Environment};
pub use error::SecretStoreError;
pub use store::{AnySecretStore, AwsSecretsManager, AzureKeyVault, GcpSecretManager, SecretStore};
