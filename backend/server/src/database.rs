//! # Redis
//!
//! RAM database.
//!
//! Holds pending signups until their code is confirmed, plus the account records themselves.
//!
//! ## Keys
//!
//! - `signup:<email>`: JSON pending registration, expires 10 minutes after the last write
//! - `account:<email>`: JSON account, written once together with its id key by `MSETNX`
//! - `account_id:<uuid>`: email of the account, for token lookups
//!
//! ## Requirements
//!
//! - Fast lookups by email
//! - Expiry handled by Redis itself, the app never re-checks timestamps
//! - Atomic create so two registrations of one email cannot both win
use std::time::Duration;

use redis::{
    Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    client.get_connection_manager_with_config(config).await
}
