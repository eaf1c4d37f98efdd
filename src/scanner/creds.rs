//! Credential feeders. Cartesian mode iterates passwords in the outer loop
//! so every password is tried with every username before advancing; combo
//! mode replays `user:pass` pairs in file order. Every send is raced
//! against the run token and the per-target done signal so a producer can
//! never block on an unread channel after the workers stop early.

use log::debug;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::common::utils;
use crate::modules::Credential;

/// Parses a combo file: one `user:pass` per line, split on the first colon.
/// Lines without a colon are dropped.
pub fn load_combos(path: &str) -> Vec<Credential> {
    utils::load_lines(path)
        .into_iter()
        .filter_map(|line| match line.split_once(':') {
            Some((user, pass)) => Some(Credential::new(user, pass)),
            None => {
                debug!("combo line {:?} has no colon, ignoring", line);
                None
            }
        })
        .collect()
}

pub enum CredentialSet {
    Cartesian {
        usernames: Vec<String>,
        passwords: Vec<String>,
    },
    Combo(Vec<Credential>),
}

impl CredentialSet {
    pub fn len(&self) -> usize {
        match self {
            CredentialSet::Cartesian {
                usernames,
                passwords,
            } => usernames.len() * passwords.len(),
            CredentialSet::Combo(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Feeds one target's credential channel. Returns early when the run is
/// cancelled or the target's workers signalled done.
pub async fn send_credentials(
    token: CancellationToken,
    done: CancellationToken,
    set: std::sync::Arc<CredentialSet>,
    tx: Sender<Credential>,
) {
    match &*set {
        CredentialSet::Cartesian {
            usernames,
            passwords,
        } => {
            for password in passwords {
                for username in usernames {
                    let cred = Credential::new(username, password);
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = done.cancelled() => return,
                        res = tx.send(cred) => {
                            if res.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
        CredentialSet::Combo(pairs) => {
            for pair in pairs {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = done.cancelled() => return,
                    res = tx.send(pair.clone()) => {
                        if res.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn combo_file(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "netbrute-combo-{}-{}",
            std::process::id(),
            content.len()
        ));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn combo_splits_on_first_colon_only() {
        let path = combo_file("admin:p:a:ss\nnocolonline\nroot:toor\n");
        let combos = load_combos(path.to_str().unwrap());
        assert_eq!(
            combos,
            vec![
                Credential::new("admin", "p:a:ss"),
                Credential::new("root", "toor"),
            ]
        );
    }

    #[tokio::test]
    async fn cartesian_emits_exactly_u_times_p_in_order() {
        let set = std::sync::Arc::new(CredentialSet::Cartesian {
            usernames: vec!["a".into(), "b".into()],
            passwords: vec!["1".into(), "2".into(), "3".into()],
        });
        assert_eq!(set.len(), 6);

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let token = CancellationToken::new();
        let done = CancellationToken::new();
        send_credentials(token, done, set, tx).await;

        let mut got = Vec::new();
        while let Some(c) = rx.recv().await {
            got.push(format!("{}:{}", c.username, c.password));
        }
        // outer loop over passwords, inner over usernames
        assert_eq!(got, vec!["a:1", "b:1", "a:2", "b:2", "a:3", "b:3"]);
    }

    #[tokio::test]
    async fn done_signal_unblocks_a_full_channel() {
        let set = std::sync::Arc::new(CredentialSet::Cartesian {
            usernames: vec!["u".into()],
            passwords: (0..1000).map(|i| i.to_string()).collect(),
        });

        // channel with room for one; nobody ever reads it
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let token = CancellationToken::new();
        let done = CancellationToken::new();

        let feeder = tokio::spawn(send_credentials(token.clone(), done.clone(), set, tx));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        done.cancel();

        // the feeder must finish promptly instead of blocking forever
        tokio::time::timeout(std::time::Duration::from_secs(2), feeder)
            .await
            .expect("feeder did not stop on done signal")
            .unwrap();
        drop(rx);
    }

    #[test]
    fn empty_wordlists_emit_zero_pairs() {
        let set = CredentialSet::Cartesian {
            usernames: vec![],
            passwords: vec!["x".into()],
        };
        assert!(set.is_empty());
    }
}
