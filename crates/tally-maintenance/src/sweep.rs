use std::sync::Arc;
use std::time::Duration;

use tally_types::api::{CleanupReport, DriftReport};
use tally_votes::{VoteService, retry_transient};
use tracing::{error, info, warn};

use crate::config::Config;

const RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Default)]
pub struct PassReport {
    pub drift: Vec<DriftReport>,
    pub cleanup: Option<CleanupReport>,
}

/// Periodic maintenance: optional old-post cleanup, then counter
/// reconciliation. Runs forever unless `config.oneshot` is set.
pub async fn run_maintenance_loop(svc: Arc<VoteService>, config: Config) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.reconcile_interval_secs));

    loop {
        interval.tick().await;

        let pass_svc = svc.clone();
        let pass_cfg = config.clone();
        match tokio::task::spawn_blocking(move || run_pass(&pass_svc, &pass_cfg)).await {
            Ok(Ok(report)) => {
                if let Some(cleanup) = &report.cleanup {
                    if cleanup.matched > 0 {
                        info!("Maintenance: pruned {} of {} old posts", cleanup.deleted, cleanup.matched);
                    }
                }
                if !report.drift.is_empty() {
                    warn!("Maintenance: repaired counters on {} entities", report.drift.len());
                }
            }
            Ok(Err(e)) => warn!("Maintenance error: {:#}", e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }

        if config.oneshot {
            break;
        }
    }
}

/// One blocking maintenance pass.
pub fn run_pass(svc: &VoteService, config: &Config) -> anyhow::Result<PassReport> {
    let db = svc.database();
    let mut report = PassReport::default();

    if let Some(days_old) = config.cleanup_days_old {
        report.cleanup = Some(db.cleanup_old_posts(days_old, config.cleanup_dry_run)?);
    }

    report.drift = retry_transient(RETRY_ATTEMPTS, || svc.reconcile_all())?;
    for d in &report.drift {
        info!(
            "Drift on {}: stored {}/{}, ledger {}/{}",
            d.entity, d.stored.upvotes, d.stored.downvotes, d.recomputed.upvotes, d.recomputed.downvotes
        );
    }

    let stats = db.stats()?;
    info!(
        "Maintenance pass done: {} users, {} posts, {} comments, {} votes",
        stats.users, stats.posts, stats.comments, stats.votes
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tally_db::Database;
    use tally_db::models::NewPost;
    use tally_types::{EntityRef, VoteCounts, VoteType};

    fn config(cleanup_days_old: Option<u32>, dry_run: bool) -> Config {
        Config {
            db_path: PathBuf::from(":memory:"),
            reconcile_interval_secs: 1,
            cleanup_days_old,
            cleanup_dry_run: dry_run,
            oneshot: true,
        }
    }

    fn service_with_post() -> (Arc<VoteService>, EntityRef) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_user("op", "op@example.com", "OP", None).unwrap();
        let id = db
            .create_post(&NewPost {
                title: "old news",
                content: "from last year",
                category: "general",
                author_id: "op",
                author_name: "OP",
                author_email: "op@example.com",
            })
            .unwrap();
        (Arc::new(VoteService::new(db)), EntityRef::post(id))
    }

    #[test]
    fn pass_repairs_drifted_counters() {
        let (svc, post) = service_with_post();
        svc.cast_vote("u1", post, VoteType::Upvote).unwrap();
        svc.database()
            .with_conn_mut(|conn| {
                conn.execute("UPDATE posts SET upvotes = 5, downvotes = 2 WHERE id = ?1", [post.id])?;
                Ok(())
            })
            .unwrap();

        let report = run_pass(&svc, &config(None, false)).unwrap();
        assert_eq!(report.drift.len(), 1);
        assert_eq!(report.drift[0].stored, VoteCounts::new(5, 2));
        assert_eq!(svc.get_counts(post).unwrap(), VoteCounts::new(1, 0));
        assert!(report.cleanup.is_none());
    }

    #[test]
    fn pass_runs_cleanup_when_configured() {
        let (svc, post) = service_with_post();
        svc.database()
            .with_conn_mut(|conn| {
                conn.execute(
                    "UPDATE posts SET created_at = datetime('now', '-90 days') WHERE id = ?1",
                    [post.id],
                )?;
                Ok(())
            })
            .unwrap();

        let dry = run_pass(&svc, &config(Some(60), true)).unwrap();
        assert_eq!(dry.cleanup.map(|c| (c.matched, c.deleted)), Some((1, 0)));

        let real = run_pass(&svc, &config(Some(60), false)).unwrap();
        assert_eq!(real.cleanup.map(|c| c.deleted), Some(1));
        assert!(svc.get_counts(post).is_err());
    }

    #[tokio::test]
    async fn oneshot_loop_returns() {
        let (svc, _) = service_with_post();
        run_maintenance_loop(svc, config(None, false)).await;
    }
}
