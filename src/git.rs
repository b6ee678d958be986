use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{Cred, ErrorClass, ErrorCode, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository, Signature};
use tempfile::TempDir;

use crate::archive_path::ArchivePath;
use crate::config::{BotIdentity, RepositoryConfig};
use crate::error::{CloneError, CommitError, PushError, StageError};

const REMOTE: &str = "origin";

/// Basic-auth credentials shared by clone and push.
#[derive(Clone)]
struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempted = false;
        callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
            // libgit2 keeps asking while the server says 401; answer only once.
            if attempted {
                return Err(git2::Error::from_str("credentials rejected by remote"));
            }
            attempted = true;
            Cred::userpass_plaintext(&self.username, &self.password)
        });
        callbacks
    }
}

/// A private clone of the archive repository, valid for one event.
///
/// The clone lives in a temporary directory that is removed on drop.
pub struct Snapshot {
    repo: Repository,
    workdir: PathBuf,
    auth: BasicAuth,
    _dir: TempDir,
}

impl Snapshot {
    /// Clone `config.url` into a fresh temporary directory.
    ///
    /// An empty remote is not an error: the snapshot starts with an unborn
    /// HEAD and the first commit creates history.
    pub fn clone_from(config: &RepositoryConfig) -> Result<Self, CloneError> {
        let dir = tempfile::Builder::new()
            .prefix("archive-snapshot-")
            .tempdir()
            .map_err(CloneError::TempDir)?;
        let workdir = dir.path().join("worktree");

        let auth = BasicAuth {
            username: config.username.clone(),
            password: config.password.clone(),
        };

        tracing::debug!(url = %config.url, depth = config.clone_depth, "cloning repository");
        let cloned = {
            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(auth.callbacks());
            if config.clone_depth > 0 {
                fetch_options.depth(i32::try_from(config.clone_depth).unwrap_or(i32::MAX));
            }

            let mut builder = git2::build::RepoBuilder::new();
            builder.fetch_options(fetch_options);
            builder.clone(&config.url, &workdir)
        };

        let repo = match cloned {
            Ok(repo) => repo,
            Err(e) if is_empty_remote(&e) => {
                tracing::info!(url = %config.url, "remote is empty, starting new history");
                init_empty(&workdir, &config.url).map_err(|source| CloneError::Init {
                    url: config.url.clone(),
                    source,
                })?
            }
            Err(e) => {
                tracing::error!(
                    "Git clone error: {} (class: {:?}, code: {:?})",
                    e.message(),
                    e.class(),
                    e.code()
                );
                return Err(CloneError::Transport {
                    url: config.url.clone(),
                    source: e,
                });
            }
        };

        Ok(Self {
            repo,
            workdir,
            auth,
            _dir: dir,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Stage exactly `path` and return the resulting tree.
    pub fn stage(&self, path: &ArchivePath) -> Result<Oid, StageError> {
        let rel = path.to_string();
        let wrap = |source| StageError {
            path: rel.clone(),
            source,
        };

        let mut index = self.repo.index().map_err(wrap)?;
        index.add_path(Path::new(&rel)).map_err(wrap)?;
        index.write().map_err(wrap)?;
        index.write_tree().map_err(wrap)
    }

    /// Commit `tree` on top of HEAD (if any) as the bot.
    pub fn commit(
        &self,
        tree: Oid,
        message: &str,
        identity: &BotIdentity,
        at: DateTime<Utc>,
    ) -> Result<Oid, CommitError> {
        let sig = Signature::new(
            &identity.name,
            &identity.email,
            &git2::Time::new(at.timestamp(), 0),
        )?;
        let tree = self.repo.find_tree(tree)?;
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        Ok(oid)
    }

    /// Push the current branch to `origin`. Returns the pushed ref name.
    ///
    /// Non-fast-forward rejections are reported, never retried here.
    pub fn push(&self) -> Result<String, PushError> {
        let head = self.repo.head().map_err(PushError::Transport)?;
        if !head.is_branch() {
            return Err(PushError::DetachedHead);
        }
        let refname = head.name().ok_or(PushError::DetachedHead)?.to_string();
        let mut remote = self.repo.find_remote(REMOTE).map_err(PushError::Transport)?;

        let mut rejected: Option<(String, String)> = None;
        {
            let mut callbacks = self.auth.callbacks();
            callbacks.push_update_reference(|name, status| {
                if let Some(reason) = status {
                    rejected = Some((name.to_string(), reason.to_string()));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let refspec = format!("{refname}:{refname}");
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| match e.code() {
                    ErrorCode::NotFastForward => PushError::Rejected {
                        refname: refname.clone(),
                        reason: e.message().to_string(),
                    },
                    _ => PushError::Transport(e),
                })?;
        }

        if let Some((refname, reason)) = rejected {
            return Err(PushError::Rejected { refname, reason });
        }

        Ok(refname)
    }
}

/// Some transports report an empty remote as a failed clone rather than an
/// unborn HEAD. Only transport and reference errors qualify; anything else
/// that happens to mention "empty" is a real failure.
fn is_empty_remote(e: &git2::Error) -> bool {
    matches!(e.class(), ErrorClass::Net | ErrorClass::Http | ErrorClass::Reference)
        && e.message().to_ascii_lowercase().contains("empty")
}

fn init_empty(workdir: &Path, url: &str) -> Result<Repository, git2::Error> {
    if workdir.exists() {
        std::fs::remove_dir_all(workdir)
            .map_err(|e| git2::Error::from_str(&format!("failed to reset {}: {e}", workdir.display())))?;
    }
    let repo = Repository::init(workdir)?;
    repo.remote(REMOTE, url)?;
    Ok(repo)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::archive;
    use crate::archive_path::DateLayout;
    use crate::models::ArchiveEntry;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap()
    }

    fn path(url: &str, channel: &str) -> ArchivePath {
        ArchivePath::resolve(url, at(), channel, DateLayout::Unpadded).unwrap()
    }

    fn entry(ts: &str) -> ArchiveEntry {
        ArchiveEntry {
            timestamp: ts.into(),
            author: "U1".into(),
            body: "hello\n".into(),
        }
    }

    /// Clone, append, stage, commit and push one entry.
    fn publish(config: &RepositoryConfig, channel: &str, ts: &str) -> Result<(Oid, String), PushError> {
        let snapshot = Snapshot::clone_from(config).unwrap();
        let target = path(&config.url, channel);
        archive::append_entry(snapshot.workdir(), &target, &entry(ts)).unwrap();
        let tree = snapshot.stage(&target).unwrap();
        let oid = snapshot
            .commit(tree, &format!("({ts}) U1@hello\n"), &BotIdentity::default(), at())
            .unwrap();
        snapshot.push().map(|refname| (oid, refname))
    }

    #[test]
    fn test_empty_remote_bootstrap() {
        let tmp = TempDir::new().unwrap();
        let (remote, url) = bare_remote(tmp.path());
        let config = repo_config(&url);

        let (oid, refname) = publish(&config, "C1", "1.0").unwrap();

        assert_eq!(remote.refname_to_id(&refname).unwrap(), oid);
        assert_eq!(history_len(&remote, &refname), 1);

        let commit = remote.find_commit(oid).unwrap();
        assert_eq!(commit.parent_count(), 0);
        assert_eq!(commit.author().name(), Some("real-history-bot"));
        assert_eq!(commit.author().email(), Some("realhistorybot@example.com"));
        assert_eq!(commit.committer().name(), Some("real-history-bot"));
        assert_eq!(commit.time().seconds(), at().timestamp());

        let blob = commit
            .tree()
            .unwrap()
            .get_path(Path::new("remote/2024/3/5/C1.md"))
            .unwrap()
            .to_object(&remote)
            .unwrap()
            .peel_to_blob()
            .unwrap();
        assert_eq!(blob.content(), b"(1.0) U1\n```\nhello\n```\n");
    }

    #[test]
    fn test_sequential_pushes_extend_history() {
        let tmp = TempDir::new().unwrap();
        let (remote, url) = bare_remote(tmp.path());
        let config = repo_config(&url);

        publish(&config, "C1", "1.0").unwrap();
        let (second, refname) = publish(&config, "C1", "2.0").unwrap();

        assert_eq!(history_len(&remote, &refname), 2);
        let commit = remote.find_commit(second).unwrap();
        let blob = commit
            .tree()
            .unwrap()
            .get_path(Path::new("remote/2024/3/5/C1.md"))
            .unwrap()
            .to_object(&remote)
            .unwrap()
            .peel_to_blob()
            .unwrap();
        assert_eq!(
            std::str::from_utf8(blob.content()).unwrap(),
            "(1.0) U1\n```\nhello\n```\n(2.0) U1\n```\nhello\n```\n"
        );
    }

    #[test]
    fn test_stage_only_touches_given_path() {
        let tmp = TempDir::new().unwrap();
        let (_remote, url) = bare_remote(tmp.path());
        let snapshot = Snapshot::clone_from(&repo_config(&url)).unwrap();

        let target = path(&url, "C1");
        archive::append_entry(snapshot.workdir(), &target, &entry("1.0")).unwrap();
        std::fs::write(snapshot.workdir().join("stray.txt"), "not archived").unwrap();

        let tree = snapshot.stage(&target).unwrap();
        let tree = snapshot.repo().find_tree(tree).unwrap();
        assert!(tree.get_path(Path::new("remote/2024/3/5/C1.md")).is_ok());
        assert!(tree.get_path(Path::new("stray.txt")).is_err());
    }

    #[test]
    fn test_concurrent_push_conflict() {
        let tmp = TempDir::new().unwrap();
        let (remote, url) = bare_remote(tmp.path());
        let config = repo_config(&url);
        let (base, refname) = publish(&config, "C0", "0.0").unwrap();

        // Both writers start from the same tip.
        let a = Snapshot::clone_from(&config).unwrap();
        let b = Snapshot::clone_from(&config).unwrap();
        let target = path(&url, "C1");

        archive::append_entry(a.workdir(), &target, &entry("1.0")).unwrap();
        let a_commit = a
            .commit(a.stage(&target).unwrap(), "a", &BotIdentity::default(), at())
            .unwrap();

        archive::append_entry(b.workdir(), &target, &entry("1.1")).unwrap();
        let b_commit = b
            .commit(b.stage(&target).unwrap(), "b", &BotIdentity::default(), at())
            .unwrap();

        assert_eq!(a.push().unwrap(), refname);
        let err = b.push().unwrap_err();
        assert!(err.is_rejected(), "{err:?}");

        let tip = remote.refname_to_id(&refname).unwrap();
        assert_eq!(tip, a_commit);
        assert_ne!(tip, b_commit);
        assert_eq!(history_len(&remote, &refname), 2);
        assert_eq!(remote.find_commit(tip).unwrap().parent_id(0).unwrap(), base);
    }

    #[test]
    fn test_clone_failure() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("does-not-exist.git");
        let err = Snapshot::clone_from(&repo_config(missing.to_str().unwrap()))
            .err()
            .unwrap();
        assert!(matches!(err, CloneError::Transport { .. }), "{err:?}");
    }

    #[test]
    fn test_empty_remote_detection() {
        let empty = git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "remote repository is empty");
        assert!(is_empty_remote(&empty));
        let unborn = git2::Error::new(ErrorCode::NotFound, ErrorClass::Reference, "Reference is EMPTY");
        assert!(is_empty_remote(&unborn));

        let disk = git2::Error::new(ErrorCode::GenericError, ErrorClass::Os, "directory not empty");
        assert!(!is_empty_remote(&disk));
        let odb = git2::Error::new(ErrorCode::GenericError, ErrorClass::Odb, "empty pack file");
        assert!(!is_empty_remote(&odb));
        let auth = git2::Error::new(ErrorCode::Auth, ErrorClass::Http, "authentication required");
        assert!(!is_empty_remote(&auth));
    }

    #[test]
    fn test_snapshot_dir_is_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let (_remote, url) = bare_remote(tmp.path());
        let snapshot = Snapshot::clone_from(&repo_config(&url)).unwrap();
        let workdir = snapshot.workdir().to_path_buf();
        assert!(workdir.exists());
        drop(snapshot);
        assert!(!workdir.exists());
    }
}
