use async_trait::async_trait;
use tracing::info;
use url::Url;

use super::{RewardReceipt, RewardRecord, RewardsGateway};
use crate::{exception::BattleError, protocol::BattleMode};

pub struct HttpRewardsGateway {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpRewardsGateway {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, BattleError> {
        // join 이 마지막 경로 조각을 덮어쓰지 않도록 '/' 로 끝나게 맞춘다.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{}/", base_url))?
        };

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token,
        })
    }

    pub fn endpoint(&self, mode: BattleMode) -> Result<Url, BattleError> {
        Ok(self
            .base_url
            .join(&format!("battles/{}/complete", mode.as_str()))?)
    }
}

#[async_trait]
impl RewardsGateway for HttpRewardsGateway {
    async fn complete_session(&self, record: &RewardRecord) -> Result<RewardReceipt, BattleError> {
        let url = self.endpoint(record.mode)?;

        let mut request = self.client.post(url).json(record);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BattleError::GatewayStatus {
                status: status.as_u16(),
                body,
            });
        }

        let receipt = response.json::<RewardReceipt>().await?;
        info!(
            "Rewards persisted for session {} ({:?})",
            record.session_id, record.outcome
        );
        Ok(receipt)
    }
}
