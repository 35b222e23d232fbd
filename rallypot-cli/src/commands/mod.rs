mod player;
mod wager;
mod watch;

pub use player::{create_player, fund_player, list_players, show_balance};
pub use wager::{
    create_match, deposit, join_match, list_matches, propose_result, show_status, sign_result,
};
pub use watch::watch_match;

use rallypot_core::{IdentityManager, SqliteLedger};
use rallypot_settle::{MatchManager, SqliteMatchStore};
use std::sync::Arc;

/// Shared handles every command works against. All of them sit on the same
/// sqlite file under the data directory.
pub struct AppContext {
    pub identities: IdentityManager,
    pub ledger: Arc<SqliteLedger>,
    pub store: Arc<SqliteMatchStore>,
    pub matches: MatchManager,
}
