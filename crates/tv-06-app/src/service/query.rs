//! Read-only query surface.
//!
//! | Path | Data | Answer |
//! |------|------|--------|
//! | `/key`, `/store` | raw native key | committed value |
//! | `/validators` | - | validators and backups (JSON) |
//! | `/validator` | owner address | candidate (JSON) |
//! | `/delegator` | delegator address | delegations (JSON) |
//! | `/awardInfo` | - | awards of the last reward epoch (JSON) |
//! | `/governance/proposals` | - | proposals with votes (JSON) |
//!
//! Every answer reflects the last committed block, never the block in
//! progress.

use serde::Serialize;
use shared_types::{Address, ErrorCode, HasErrorCode};
use tv_02_evm_bridge::{Executor, WorldState};
use tv_03_native_store::KeyValueStore;
use tv_04_staking::{Candidate, CandidateState, StakeError, StakingStore, AWARD_INFO_KEY};
use tv_05_governance::GovernanceService;

use super::TravisApp;
use crate::abci::{RequestQuery, ResponseQuery};
use crate::errors::{AppError, AppResult};

impl<S: WorldState, E: Executor, KV: KeyValueStore> TravisApp<S, E, KV> {
    pub fn handle_query(&self, req: RequestQuery) -> ResponseQuery {
        let height = self.last_block_height();
        match self.answer(&req) {
            Ok(value) => ResponseQuery {
                code: ErrorCode::Ok.as_u32(),
                log: String::new(),
                key: req.data,
                value,
                height,
            },
            Err(e) => ResponseQuery {
                code: e.code().as_u32(),
                log: e.to_string(),
                key: req.data,
                value: Vec::new(),
                height,
            },
        }
    }

    fn answer(&self, req: &RequestQuery) -> AppResult<Vec<u8>> {
        match req.path.as_str() {
            "/key" | "/store" => Ok(self.native.get_committed(&req.data)?.unwrap_or_default()),
            "/validators" => {
                let store = self.committed_staking()?;
                let seated: Vec<&Candidate> = store
                    .candidates()
                    .filter(|c| {
                        matches!(
                            c.state,
                            CandidateState::Validator | CandidateState::BackupValidator
                        )
                    })
                    .collect();
                to_json(&seated)
            }
            "/validator" => {
                let owner = parse_address(&req.data)?;
                let store = self.committed_staking()?;
                let candidate = store
                    .candidate_by_address(&owner)
                    .ok_or_else(|| StakeError::CandidateNotFound(owner.to_string()))?;
                to_json(candidate)
            }
            "/delegator" => {
                let delegator = parse_address(&req.data)?;
                let store = self.committed_staking()?;
                to_json(&store.delegations_of(&delegator))
            }
            "/awardInfo" => Ok(self
                .native
                .get_committed(AWARD_INFO_KEY)?
                .unwrap_or_else(|| b"[]".to_vec())),
            "/governance/proposals" => {
                let governance = GovernanceService::load(self.native.kv())?;
                to_json(&governance.proposals())
            }
            other => Err(AppError::UnknownQuery(other.to_string())),
        }
    }

    fn committed_staking(&self) -> AppResult<StakingStore> {
        Ok(StakingStore::load(self.native.kv())?)
    }
}

fn parse_address(data: &[u8]) -> AppResult<Address> {
    let text = std::str::from_utf8(data).map_err(|e| AppError::InvalidQuery(e.to_string()))?;
    text.trim()
        .parse()
        .map_err(|e: shared_types::ParseError| AppError::InvalidQuery(e.to_string()))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> AppResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AppError::InvalidQuery(e.to_string()))
}
