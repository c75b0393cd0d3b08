//! Multi-document transactions.
//!
//! Every transaction runs on its own [`ClientSession`]; dropping the session
//! aborts whatever is still in progress, so no exit path leaks a lock.

use std::future::Future;
use std::time::Duration;

use mongodb::{
    error::UNKNOWN_TRANSACTION_COMMIT_RESULT,
    options::{ReadConcern, TransactionOptions, WriteConcern},
    Client, ClientSession,
};
use rocket::tokio::time::sleep;

use crate::error::{Error, Result};

use super::errors::is_transient;

/// How many times a transaction is attempted before a write conflict is
/// reported as a failure.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 10;

/// Delay added before each successive attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Commits with an unknown outcome are retried this many times.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Start a session with a snapshot-isolated, majority-acknowledged transaction.
pub async fn start(db_client: &Client) -> Result<ClientSession> {
    let mut session = db_client.start_session(None).await?;
    let options = TransactionOptions::builder()
        .read_concern(Some(ReadConcern::snapshot()))
        .write_concern(Some(WriteConcern::MAJORITY))
        .build();
    session.start_transaction(options).await?;
    Ok(session)
}

/// Commit the transaction if `result` is a success, otherwise abort it.
/// The original result is passed through unless committing fails.
pub async fn finish<T>(session: &mut ClientSession, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            commit(session).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = session.abort_transaction().await {
                debug!("Abort after failure was rejected: {abort_err}");
            }
            Err(err)
        }
    }
}

async fn commit(session: &mut ClientSession) -> Result<()> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Err(err)
                if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && attempt < MAX_COMMIT_ATTEMPTS =>
            {
                warn!("Commit outcome unknown, retrying: {err}");
                attempt += 1;
            }
            result => return result.map_err(Into::into),
        }
    }
}

/// Run `attempt` until it succeeds, fails for a non-transient reason, or
/// runs out of attempts. Each call must start its own transaction.
pub async fn retry_transient<T, F, Fut>(mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(Error::Db(err)) if is_transient(&err) && tries < MAX_TRANSACTION_ATTEMPTS => {
                debug!("Transaction attempt {tries} conflicted, retrying: {err}");
                sleep(RETRY_BACKOFF * tries).await;
                tries += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use mongodb::{
        bson::{doc, from_document},
        error::{CommandError, ErrorKind},
    };

    use super::*;
    use crate::model::mongodb::errors::WRITE_CONFLICT;

    fn write_conflict() -> Error {
        let reply = doc! {
            "code": WRITE_CONFLICT,
            "codeName": "WriteConflict",
            "errmsg": "write conflict",
        };
        let command_error: CommandError = from_document(reply).unwrap();
        Error::Db(ErrorKind::Command(command_error).into())
    }

    #[rocket::async_test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(write_conflict())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[rocket::async_test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_transient(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(write_conflict())
        })
        .await;
        assert!(matches!(result, Err(Error::Db(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_TRANSACTION_ATTEMPTS);
    }

    #[rocket::async_test]
    async fn business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_transient(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidPin)
        })
        .await;
        assert!(matches!(result, Err(Error::InvalidPin)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
