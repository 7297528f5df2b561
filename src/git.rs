use std::path::Path;

use git2::build::RepoBuilder;
use git2::{FetchOptions, Repository};

use crate::{blog_debug, Result};

pub struct GitOps;

impl GitOps {
    /// Clone only `branch` of `url` into `dest`.
    ///
    /// Remote clones fetch a single commit. Local sources are cloned in
    /// full since libgit2's local transport cannot do shallow fetches.
    pub fn clone_branch(url: &str, branch: &str, dest: &Path) -> Result<Repository> {
        blog_debug!(
            "GitOps::clone_branch url={} branch={} dest={}",
            url,
            branch,
            dest.display()
        );
        let mut fetch = FetchOptions::new();
        if !is_local(url) {
            fetch.depth(1);
        }

        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);
        let mut builder = RepoBuilder::new();
        builder
            .branch(branch)
            .fetch_options(fetch)
            .remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));

        let repo = builder.clone(url, dest)?;
        blog_debug!("Cloned {} into {}", url, dest.display());
        Ok(repo)
    }

    /// Name of the branch HEAD points at, if any.
    pub fn current_branch(path: &Path) -> Result<Option<String>> {
        let repo = Repository::open(path)?;
        let head = repo.head()?;
        Ok(head.shorthand().map(String::from))
    }
}

fn is_local(url: &str) -> bool {
    url.starts_with("file://") || url.starts_with('/') || url.starts_with('.')
}
