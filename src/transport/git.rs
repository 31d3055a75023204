//! Git transport backed by libgit2
use std::{
    cell::RefCell,
    fs::{create_dir_all, remove_dir_all},
    path::{Path, PathBuf},
};

use git2::{
    AutotagOption, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, PushOptions,
    ReferenceType, RemoteCallbacks, Repository,
};

use super::{
    ensure_empty_destination, redact, tail, PushMode, Transport, TransportError,
    TransportErrorKind, TransportFuture,
};
use crate::retry::RetryPolicy;

/// Refs transferred by a mirror
const MIRRORED_REFS: [&str; 2] = ["refs/heads/", "refs/tags/"];

/// Username used with a token over HTTPS
const TOKEN_USERNAME: &str = "x-access-token";

/// Number of diagnostic lines kept in error messages
const DIAGNOSTIC_LINES: usize = 10;

/// Mirror transport using git2
#[derive(Debug, Clone)]
pub struct GitTransport {
    /// Retry schedule for network failures
    retry: RetryPolicy,
}

impl Default for GitTransport {
    fn default() -> Self {
        Self::new(RetryPolicy::transport())
    }
}

impl GitTransport {
    /// Create a new GitTransport
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }
}

impl Transport for GitTransport {
    fn mirror_clone(
        &self,
        source_url: &str,
        token: Option<&str>,
        dest_dir: &Path,
    ) -> TransportFuture<'_> {
        let url = source_url.to_string();
        let token = token.map(str::to_owned);
        let dest = dest_dir.to_path_buf();
        Box::pin(async move {
            ensure_empty_destination(&dest)?;
            self.retry
                .run("mirror clone", || {
                    let url = url.clone();
                    let token = token.clone();
                    let dest = dest.clone();
                    async move {
                        blocking(move || clone_blocking(&url, token.as_deref(), &dest)).await
                    }
                })
                .await
        })
    }

    fn mirror_push(
        &self,
        src_dir: &Path,
        target_url: &str,
        token: Option<&str>,
        mode: PushMode,
    ) -> TransportFuture<'_> {
        let src = src_dir.to_path_buf();
        let url = target_url.to_string();
        let token = token.map(str::to_owned);
        Box::pin(async move {
            self.retry
                .run("mirror push", || {
                    let src = src.clone();
                    let url = url.clone();
                    let token = token.clone();
                    async move {
                        blocking(move || push_blocking(&src, &url, token.as_deref(), mode)).await
                    }
                })
                .await
        })
    }
}

/// Run a libgit2 call off the async runtime
async fn blocking<F>(f: F) -> Result<(), TransportError>
where
    F: FnOnce() -> Result<(), TransportError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res,
        Err(e) => Err(TransportError::new(
            TransportErrorKind::ProcessFailure,
            format!("transport task failed: {e}"),
        )),
    }
}

/// Bare fetch of all branches and tags
fn clone_blocking(url: &str, token: Option<&str>, dest: &Path) -> Result<(), TransportError> {
    log::debug!("Cloning '{}' into '{}'", redact(url), dest.display());
    create_dir_all(dest).map_err(|e| {
        TransportError::new(
            TransportErrorKind::InvalidDestination,
            format!("unable to create '{}': {e}", dest.display()),
        )
    })?;
    let diagnostics = RefCell::new(String::new());
    let res = (|| -> Result<(), git2::Error> {
        let repo = Repository::init_bare(dest)?;
        let mut remote = repo.remote_anonymous(url)?;
        let mut callbacks = remote_callbacks(token);
        callbacks.sideband_progress(|data| {
            diagnostics
                .borrow_mut()
                .push_str(&String::from_utf8_lossy(data));
            true
        });
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(callbacks);
        fetch_opts.download_tags(AutotagOption::All);
        let refspecs: Vec<String> = MIRRORED_REFS
            .iter()
            .map(|prefix| format!("+{prefix}*:{prefix}*"))
            .collect();
        remote.fetch(&refspecs, Some(&mut fetch_opts), None)?;
        Ok(())
    })();
    match res {
        Ok(()) => Ok(()),
        Err(e) => {
            // a failed fetch must not leave a half-written mirror behind
            if let Err(rm) = remove_dir_all(dest) {
                log::warn!("Unable to remove '{}': {rm}", dest.display());
            }
            Err(to_transport_error(&e, &diagnostics.borrow()))
        }
    }
}

/// Push all branches and tags of a bare repository
fn push_blocking(
    src: &Path,
    url: &str,
    token: Option<&str>,
    mode: PushMode,
) -> Result<(), TransportError> {
    let repo = Repository::open_bare(src).map_err(|e| to_transport_error(&e, ""))?;
    let refspecs = mirror_refspecs(&repo, mode).map_err(|e| to_transport_error(&e, ""))?;
    if refspecs.is_empty() {
        log::info!("Nothing to push from '{}'", src.display());
        return Ok(());
    }
    log::debug!("Pushing {} refs to '{}'", refspecs.len(), redact(url));
    let diagnostics = RefCell::new(String::new());
    let rejected = RefCell::new(Vec::<String>::new());
    let res = (|| -> Result<(), git2::Error> {
        let mut remote = repo.remote_anonymous(url)?;
        let mut callbacks = remote_callbacks(token);
        callbacks.sideband_progress(|data| {
            diagnostics
                .borrow_mut()
                .push_str(&String::from_utf8_lossy(data));
            true
        });
        callbacks.push_update_reference(|refname, status| {
            if let Some(msg) = status {
                rejected.borrow_mut().push(format!("{refname}: {msg}"));
            }
            Ok(())
        });
        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);
        remote.push(&refspecs, Some(&mut opts))?;
        Ok(())
    })();
    if let Err(e) = res {
        return Err(to_transport_error(&e, &diagnostics.borrow()));
    }
    let rejected = rejected.into_inner();
    if !rejected.is_empty() {
        return Err(TransportError::new(
            TransportErrorKind::RefConflict,
            rejected.join("\n"),
        ));
    }
    Ok(())
}

/// One refspec per mirrored direct reference
fn mirror_refspecs(repo: &Repository, mode: PushMode) -> Result<Vec<String>, git2::Error> {
    let force = match mode {
        PushMode::Force => "+",
        PushMode::FastForward => "",
    };
    let mut refspecs = vec![];
    for reference in repo.references()? {
        let reference = reference?;
        if reference.kind() != Some(ReferenceType::Direct) {
            continue;
        }
        let ref_name = match reference.name() {
            Some(name) => name,
            None => continue,
        };
        if MIRRORED_REFS.iter().any(|prefix| ref_name.starts_with(prefix)) {
            refspecs.push(format!("{force}{ref_name}:{ref_name}"));
        }
    }
    Ok(refspecs)
}

/// Credentials: token over HTTPS, ssh agent otherwise
fn remote_callbacks<'a>(token: Option<&str>) -> RemoteCallbacks<'a> {
    let token = token.map(str::to_owned);
    let mut attempts = 0;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Http,
                "credentials rejected by the remote",
            ));
        }
        match &token {
            Some(token) if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) => {
                Cred::userpass_plaintext(TOKEN_USERNAME, token)
            }
            _ if allowed.contains(CredentialType::SSH_KEY) => {
                Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
            }
            _ => Cred::default(),
        }
    });
    callbacks
}

/// Map a libgit2 failure to the transport taxonomy
fn to_transport_error(e: &git2::Error, diagnostics: &str) -> TransportError {
    let message = e.message().to_string();
    let lower = message.to_lowercase();
    let kind = match (e.code(), e.class()) {
        (ErrorCode::Auth | ErrorCode::Certificate, _) => TransportErrorKind::AuthRequired,
        _ if lower.contains("authentication") || lower.contains("401") || lower.contains("403") => {
            TransportErrorKind::AuthRequired
        }
        (ErrorCode::NotFastForward | ErrorCode::Conflict | ErrorCode::Locked, _) => {
            TransportErrorKind::RefConflict
        }
        _ if lower.contains("404") || lower.contains("not found") => {
            TransportErrorKind::ProcessFailure
        }
        (_, ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Os) => {
            TransportErrorKind::NetworkError
        }
        _ => TransportErrorKind::ProcessFailure,
    };
    let diagnostics = tail(diagnostics, DIAGNOSTIC_LINES);
    let message = if diagnostics.is_empty() {
        message
    } else {
        format!("{message}\n{diagnostics}")
    };
    TransportError::new(kind, message)
}

/// Default clone location inside a working directory
pub(crate) fn mirror_dir(work_dir: &Path) -> PathBuf {
    work_dir.join("mirror.git")
}

#[cfg(test)]
mod test {
    use super::*;
    use git2::Signature;

    /// Bare repository with branches main and dev, and tag v1
    fn source_repo(root: &Path) -> PathBuf {
        let path = root.join("source.git");
        let repo = Repository::init_bare(&path).unwrap();
        let sig = Signature::now("Tester", "tester@example.com").unwrap();
        let tree_id = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let first = repo
            .commit(Some("refs/heads/main"), &sig, &sig, "first", &tree, &[])
            .unwrap();
        let first = repo.find_commit(first).unwrap();
        repo.commit(Some("refs/heads/dev"), &sig, &sig, "second", &tree, &[&first])
            .unwrap();
        repo.tag_lightweight("v1", first.as_object(), false).unwrap();
        path
    }

    fn ref_names(path: &Path) -> Vec<String> {
        let repo = Repository::open_bare(path).unwrap();
        let mut names: Vec<String> = repo
            .references()
            .unwrap()
            .filter_map(|r| r.ok().and_then(|r| r.name().map(str::to_owned)))
            .collect();
        names.sort();
        names
    }

    fn transport() -> GitTransport {
        GitTransport::new(RetryPolicy::none())
    }

    #[tokio::test]
    async fn mirror_clone_then_push() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_repo(dir.path());
        let target = dir.path().join("target.git");
        Repository::init_bare(&target).unwrap();
        let mirror = mirror_dir(&dir.path().join("work"));

        let transport = transport();
        transport
            .mirror_clone(source.to_str().unwrap(), None, &mirror)
            .await
            .unwrap();
        transport
            .mirror_push(&mirror, target.to_str().unwrap(), None, PushMode::Force)
            .await
            .unwrap();

        let refs = ref_names(&target);
        for expected in ["refs/heads/dev", "refs/heads/main", "refs/tags/v1"] {
            assert!(refs.contains(&expected.to_string()), "{refs:?}");
        }
    }

    #[tokio::test]
    async fn clone_into_non_empty_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_repo(dir.path());
        std::fs::write(dir.path().join("junk"), b"x").unwrap();
        let err = transport()
            .mirror_clone(source.to_str().unwrap(), None, dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::InvalidDestination);
    }

    #[tokio::test]
    async fn failed_clone_leaves_no_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("mirror.git");
        let missing = dir.path().join("does-not-exist.git");
        let err = transport()
            .mirror_clone(missing.to_str().unwrap(), None, &mirror)
            .await
            .unwrap_err();
        assert_ne!(err.kind, TransportErrorKind::InvalidDestination);
        assert!(!mirror.exists());
    }

    #[test]
    fn force_mode_prefixes_refspecs() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open_bare(source_repo(dir.path())).unwrap();
        let forced = mirror_refspecs(&repo, PushMode::Force).unwrap();
        assert!(forced.contains(&"+refs/heads/main:refs/heads/main".to_string()));
        assert!(forced.contains(&"+refs/tags/v1:refs/tags/v1".to_string()));
        let ff = mirror_refspecs(&repo, PushMode::FastForward).unwrap();
        assert!(ff.iter().all(|r| !r.starts_with('+')));
        assert_eq!(ff.len(), 3);
    }

    #[test]
    fn auth_errors_are_classified() {
        let e = git2::Error::new(ErrorCode::Auth, ErrorClass::Http, "denied");
        assert_eq!(
            to_transport_error(&e, "").kind,
            TransportErrorKind::AuthRequired
        );
        let e = git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "reset by peer");
        let err = to_transport_error(&e, "remote: line1\nremote: line2\n");
        assert_eq!(err.kind, TransportErrorKind::NetworkError);
        assert!(err.message.ends_with("remote: line2"));
        let e = git2::Error::new(ErrorCode::NotFastForward, ErrorClass::Reference, "nff");
        assert_eq!(
            to_transport_error(&e, "").kind,
            TransportErrorKind::RefConflict
        );
    }
}
