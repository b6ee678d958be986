//! Fixtures shared by the integration tests.
//!
//! These mirror `git::test_support`, which is private to the library's unit
//! tests. Keep the two in step.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chat_archive_bot::config::{BotIdentity, Config, RepositoryConfig, SlackConfig};
use git2::Repository;

/// Bare repository at `root/rel`, returned with its path as a clone URL.
pub fn bare_remote(root: &Path, rel: &str) -> (Repository, String) {
    let path = root.join(rel);
    let repo = Repository::init_bare(&path).unwrap();
    (repo, path.to_str().unwrap().to_string())
}

pub fn repository(url: &str, clone_depth: u32) -> RepositoryConfig {
    RepositoryConfig {
        url: url.to_string(),
        username: "archiver".into(),
        password: "secret".into(),
        clone_depth,
    }
}

/// Full clones, since local transports do not support shallow fetches.
pub fn config(url: &str, push_conflict_retries: u32) -> Arc<Config> {
    config_with(repository(url, 0), push_conflict_retries)
}

pub fn config_with(repository: RepositoryConfig, push_conflict_retries: u32) -> Arc<Config> {
    Arc::new(Config {
        slack: SlackConfig {
            app_token: "xapp-test".into(),
            bot_token: "xoxb-test".into(),
            signing_secret: None,
        },
        repository,
        identity: BotIdentity::default(),
        date_layout: Default::default(),
        push_conflict_retries,
        bind_address: "127.0.0.1:0".into(),
    })
}

pub fn read_blob(repo: &Repository, commit: git2::Oid, path: &str) -> String {
    let blob = repo
        .find_commit(commit)
        .unwrap()
        .tree()
        .unwrap()
        .get_path(Path::new(path))
        .unwrap()
        .to_object(repo)
        .unwrap()
        .peel_to_blob()
        .unwrap();
    String::from_utf8(blob.content().to_vec()).unwrap()
}

pub fn history_len(repo: &Repository, refname: &str) -> usize {
    let mut walk = repo.revwalk().unwrap();
    walk.push(repo.refname_to_id(refname).unwrap()).unwrap();
    walk.count()
}
