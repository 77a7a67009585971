use notion_mirror_core::change::content_digest;
use notion_mirror_core::commit::{publish, CommitCandidate, CommitOutcome, CommitStage, PublishedFile};
use notion_mirror_core::config::CommitMode;
use notion_mirror_core::contract::{BranchHead, MockDestinationStore, RemoteFile};
use notion_mirror_core::error::StoreError;
use notion_mirror_core::retry::RetryPolicy;

fn candidate(i: usize) -> CommitCandidate {
    let content = format!("# Note {i}\n").into_bytes();
    CommitCandidate {
        document_id: format!("doc-{i}"),
        path: format!("notes/Db/Note_{i}.md"),
        folder: "Db".to_string(),
        filename: format!("Note_{i}"),
        digest: content_digest(&content),
        content,
        is_new: true,
        prior_revision: None,
    }
}

fn paths(files: &[PublishedFile]) -> Vec<&str> {
    files.iter().map(|f| f.path.as_str()).collect()
}

fn atomic_path_until_ref_update(store: &mut MockDestinationStore, blobs: usize) {
    store.expect_read_head().times(1).returning(|| {
        Ok(BranchHead {
            commit_id: "head".to_string(),
            tree_id: "base-tree".to_string(),
        })
    });
    store
        .expect_create_blob()
        .times(blobs)
        .returning(|_| Ok("blob".to_string()));
    store
        .expect_create_tree()
        .times(1)
        .withf(move |base, entries| base == "base-tree" && entries.len() == blobs)
        .returning(|_, _| Ok("tree".to_string()));
    store
        .expect_create_commit()
        .times(1)
        .withf(|_, tree, parents| tree == "tree" && parents == &vec!["head".to_string()])
        .returning(|_, _, _| Ok("commit".to_string()));
    store
        .expect_update_ref()
        .times(1)
        .returning(|_| Err(StoreError::Conflict("not a fast-forward".to_string())));
}

#[tokio::test]
async fn rejected_ref_update_falls_back_to_per_file_writes() {
    let candidates: Vec<CommitCandidate> = (0..10).map(candidate).collect();
    let mut store = MockDestinationStore::new();
    atomic_path_until_ref_update(&mut store, 10);
    store.expect_get_file().times(10).returning(|_| Ok(None));
    store
        .expect_put_file()
        .times(10)
        .withf(|req| req.prior_revision.is_none() && req.message.starts_with("更新笔记: Db/"))
        .returning(|_| Ok(()));

    let outcome = publish(&store, candidates, CommitMode::Atomic, &RetryPolicy::none()).await;

    assert_eq!(outcome.published(), 10);
    match outcome {
        CommitOutcome::PerFile {
            conflicts,
            failures,
            atomic_failure,
            ..
        } => {
            assert!(conflicts.is_empty());
            assert!(failures.is_empty());
            let failure = atomic_failure.expect("atomic failure recorded");
            assert_eq!(failure.stage, CommitStage::UpdateRef);
            assert!(matches!(failure.error, StoreError::Conflict(_)));
        }
        other => panic!("expected per-file fallback, got {other:?}"),
    }
}

#[tokio::test]
async fn fallback_skips_current_and_concurrently_changed_files() {
    let mut current = candidate(0);
    current.is_new = false;
    current.prior_revision = Some("r0".to_string());
    let mut changed = candidate(1);
    changed.is_new = false;
    changed.prior_revision = Some("r1".to_string());
    let mut stale = candidate(2);
    stale.is_new = false;
    stale.prior_revision = Some("r2".to_string());
    let fresh = candidate(3);
    let current_content = current.content.clone();

    let mut store = MockDestinationStore::new();
    store.expect_get_file().returning(move |path| {
        Ok(match path {
            // Someone already wrote exactly what we wanted.
            "notes/Db/Note_0.md" => Some(RemoteFile {
                content: current_content.clone(),
                revision: "r0b".to_string(),
            }),
            // Edited by someone else since detection.
            "notes/Db/Note_1.md" => Some(RemoteFile {
                content: b"edited".to_vec(),
                revision: "r1b".to_string(),
            }),
            "notes/Db/Note_2.md" => Some(RemoteFile {
                content: b"old".to_vec(),
                revision: "r2".to_string(),
            }),
            _ => None,
        })
    });
    store.expect_put_file().times(2).returning(|req| {
        if req.path == "notes/Db/Note_2.md" {
            Err(StoreError::Conflict("sha mismatch".to_string()))
        } else {
            Ok(())
        }
    });

    let outcome = publish(
        &store,
        vec![current, changed, stale, fresh],
        CommitMode::PerFile,
        &RetryPolicy::none(),
    )
    .await;

    match outcome {
        CommitOutcome::PerFile {
            published,
            already_current,
            conflicts,
            failures,
            atomic_failure,
        } => {
            assert_eq!(paths(&published), vec!["notes/Db/Note_3.md"]);
            assert_eq!(paths(&already_current), vec!["notes/Db/Note_0.md"]);
            assert_eq!(conflicts, vec!["notes/Db/Note_1.md", "notes/Db/Note_2.md"]);
            assert!(failures.is_empty());
            assert!(atomic_failure.is_none());
        }
        other => panic!("expected per-file outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn successful_atomic_commit_touches_no_files_directly() {
    let mut store = MockDestinationStore::new();
    store.expect_read_head().returning(|| {
        Ok(BranchHead {
            commit_id: "head".to_string(),
            tree_id: "base-tree".to_string(),
        })
    });
    store
        .expect_create_blob()
        .times(3)
        .returning(|_| Ok("blob".to_string()));
    store
        .expect_create_tree()
        .returning(|_, _| Ok("tree".to_string()));
    store
        .expect_create_commit()
        .withf(|message, _, _| message.contains("新增 3 个文件"))
        .returning(|_, _, _| Ok("commit-1".to_string()));
    store.expect_update_ref().returning(|_| Ok(()));
    store.expect_put_file().never();

    let outcome = publish(
        &store,
        (0..3).map(candidate).collect(),
        CommitMode::Atomic,
        &RetryPolicy::none(),
    )
    .await;

    match outcome {
        CommitOutcome::Atomic {
            commit_id,
            published,
        } => {
            assert_eq!(commit_id, "commit-1");
            assert_eq!(published.len(), 3);
        }
        other => panic!("expected atomic commit, got {other:?}"),
    }
}

const STAGES: [CommitStage; 5] = [
    CommitStage::ReadHead,
    CommitStage::CreateBlob,
    CommitStage::CreateTree,
    CommitStage::CreateCommit,
    CommitStage::UpdateRef,
];

fn order(stage: CommitStage) -> usize {
    STAGES.iter().position(|s| *s == stage).unwrap_or(STAGES.len())
}

/// Expect the atomic path to run up to `failing`, fail there, and go no further.
/// Blob creation fails on its `failing_blob`-th call.
fn atomic_path_failing_at(
    store: &mut MockDestinationStore,
    failing: CommitStage,
    blobs: usize,
    failing_blob: usize,
) {
    let stop = order(failing);
    let reached = |stage: CommitStage| order(stage) <= stop;

    store.expect_read_head().times(1).returning(move || {
        if failing == CommitStage::ReadHead {
            Err(StoreError::NotFound("refs/heads/main".to_string()))
        } else {
            Ok(BranchHead {
                commit_id: "head".to_string(),
                tree_id: "base-tree".to_string(),
            })
        }
    });

    if !reached(CommitStage::CreateBlob) {
        store.expect_create_blob().never();
    } else if failing == CommitStage::CreateBlob {
        let mut calls = 0;
        store
            .expect_create_blob()
            .times(failing_blob)
            .returning(move |_| {
                calls += 1;
                if calls == failing_blob {
                    Err(StoreError::Api {
                        status: 400,
                        message: "blob too large".to_string(),
                    })
                } else {
                    Ok(format!("blob-{calls}"))
                }
            });
    } else {
        store
            .expect_create_blob()
            .times(blobs)
            .returning(|_| Ok("blob".to_string()));
    }

    if !reached(CommitStage::CreateTree) {
        store.expect_create_tree().never();
    } else {
        store.expect_create_tree().times(1).returning(move |_, _| {
            if failing == CommitStage::CreateTree {
                Err(StoreError::Api {
                    status: 422,
                    message: "invalid tree".to_string(),
                })
            } else {
                Ok("tree".to_string())
            }
        });
    }

    if !reached(CommitStage::CreateCommit) {
        store.expect_create_commit().never();
    } else {
        store.expect_create_commit().times(1).returning(move |_, _, _| {
            if failing == CommitStage::CreateCommit {
                Err(StoreError::Transient("bad gateway".to_string()))
            } else {
                Ok("commit".to_string())
            }
        });
    }

    store.expect_update_ref().never();
}

#[tokio::test]
async fn any_failing_atomic_stage_falls_back_without_touching_the_ref() {
    let cases = [
        (CommitStage::ReadHead, 1),
        (CommitStage::CreateBlob, 1),
        (CommitStage::CreateBlob, 3),
        (CommitStage::CreateTree, 1),
        (CommitStage::CreateCommit, 1),
    ];
    for (stage, failing_blob) in cases {
        let candidates: Vec<CommitCandidate> = (0..5).map(candidate).collect();
        let mut store = MockDestinationStore::new();
        atomic_path_failing_at(&mut store, stage, candidates.len(), failing_blob);
        store.expect_get_file().times(5).returning(|_| Ok(None));
        store.expect_put_file().times(5).returning(|_| Ok(()));

        let outcome = publish(&store, candidates, CommitMode::Atomic, &RetryPolicy::none()).await;

        assert_eq!(outcome.published(), 5, "stage {stage}, blob {failing_blob}");
        match outcome {
            CommitOutcome::PerFile {
                atomic_failure,
                conflicts,
                failures,
                ..
            } => {
                let failure = atomic_failure.expect("atomic failure recorded");
                assert_eq!(failure.stage, stage);
                assert!(conflicts.is_empty());
                assert!(failures.is_empty());
            }
            other => panic!("expected per-file fallback at {stage}, got {other:?}"),
        }
        store.checkpoint();
    }
}
