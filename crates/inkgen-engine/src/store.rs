use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fd_lock::RwLock;
use inkgen_contracts::accounts::{Account, GenerationRecord, Identity};
use inkgen_contracts::events::now_utc_iso;
use sha2::{Digest, Sha256};

/// Result of a conditional credit decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { remaining: u32 },
    /// Balance was already zero; nothing changed.
    Insufficient,
}

/// Account documents and per-user generation history.
pub trait ProfileStore: Send + Sync {
    fn fetch_account(&self, uid: &str) -> Result<Option<Account>>;

    /// Creates a fresh free-tier account. Returns the stored document
    /// unchanged if one already exists.
    fn create_account(&self, identity: &Identity) -> Result<Account>;

    /// Decrements credits by one, only if the balance is positive.
    fn debit_credit(&self, uid: &str) -> Result<DebitOutcome>;

    fn append_generation(
        &self,
        uid: &str,
        prompt: &str,
        image_refs: &[String],
    ) -> Result<GenerationRecord>;

    /// History in write order.
    fn list_generations(&self, uid: &str) -> Result<Vec<GenerationRecord>>;
}

/// Document store rooted at a local directory. Uids are opaque; each one is
/// keyed on disk by the hex SHA-256 of its bytes:
///
/// - `users/<key>.json` holds the account document
/// - `users/<key>/generations.jsonl` holds one record per line
/// - `users/<key>.lock` is held exclusively around every write
///
/// The lock is an OS file lock, so separate processes sharing a root
/// serialize too. Account documents are replaced by rename and never
/// observed half-written.
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    root: PathBuf,
}

struct UserFiles {
    account: PathBuf,
    generations: PathBuf,
    lock: PathBuf,
}

impl FileProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_files(&self, uid: &str) -> Result<UserFiles> {
        if uid.is_empty() {
            bail!("user id must not be empty");
        }
        let key = hex::encode(Sha256::digest(uid.as_bytes()));
        let users = self.root.join("users");
        Ok(UserFiles {
            account: users.join(format!("{key}.json")),
            generations: users.join(&key).join("generations.jsonl"),
            lock: users.join(format!("{key}.lock")),
        })
    }

    /// Runs `write` while holding the per-user lock file.
    fn locked<T>(&self, files: &UserFiles, write: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(parent) = files.lock.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&files.lock)
            .with_context(|| format!("failed to open {}", files.lock.display()))?;
        let mut lock = RwLock::new(file);
        let _guard = lock
            .write()
            .with_context(|| format!("failed to lock {}", files.lock.display()))?;
        write()
    }
}

impl ProfileStore for FileProfileStore {
    fn fetch_account(&self, uid: &str) -> Result<Option<Account>> {
        let files = self.user_files(uid)?;
        read_account(&files.account)
    }

    fn create_account(&self, identity: &Identity) -> Result<Account> {
        let files = self.user_files(&identity.uid)?;
        self.locked(&files, || {
            if let Some(existing) = read_account(&files.account)? {
                return Ok(existing);
            }
            let account = Account::for_identity(identity);
            replace_account(&files.account, &account)?;
            Ok(account)
        })
    }

    fn debit_credit(&self, uid: &str) -> Result<DebitOutcome> {
        let files = self.user_files(uid)?;
        self.locked(&files, || {
            let Some(mut account) = read_account(&files.account)? else {
                bail!("no account document for {uid}");
            };
            if account.credits == 0 {
                return Ok(DebitOutcome::Insufficient);
            }
            account.credits -= 1;
            replace_account(&files.account, &account)?;
            Ok(DebitOutcome::Debited {
                remaining: account.credits,
            })
        })
    }

    fn append_generation(
        &self,
        uid: &str,
        prompt: &str,
        image_refs: &[String],
    ) -> Result<GenerationRecord> {
        let files = self.user_files(uid)?;
        let record = GenerationRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.to_string(),
            image_refs: image_refs.to_vec(),
            created_at: now_utc_iso(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        self.locked(&files, || {
            if let Some(parent) = files.generations.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&files.generations)
                .with_context(|| format!("failed to open {}", files.generations.display()))?;
            file.write_all(&line)?;
            Ok(())
        })?;
        Ok(record)
    }

    fn list_generations(&self, uid: &str) -> Result<Vec<GenerationRecord>> {
        let path = self.user_files(uid)?.generations;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(idx, line)| {
                serde_json::from_str::<GenerationRecord>(line).with_context(|| {
                    format!("invalid generation record at {}:{}", path.display(), idx + 1)
                })
            })
            .collect()
    }
}

fn read_account(path: &Path) -> Result<Option<Account>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let account = serde_json::from_str(&raw)
        .with_context(|| format!("invalid account document {}", path.display()))?;
    Ok(Some(account))
}

/// Writes beside the target, then renames over it.
fn replace_account(path: &Path, account: &Account) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut file =
        File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    file.write_all(serde_json::to_string_pretty(account)?.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use inkgen_contracts::accounts::{Identity, Plan};

    use super::{DebitOutcome, FileProfileStore, ProfileStore};

    #[test]
    fn create_account_is_idempotent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = FileProfileStore::new(temp.path());
        let mut identity = Identity::new("uid-1");
        identity.email = Some("ink@example.com".to_string());

        assert!(store.fetch_account("uid-1")?.is_none());
        let created = store.create_account(&identity)?;
        assert_eq!(created.credits, 3);
        assert_eq!(created.plan, Plan::Free);

        store.debit_credit("uid-1")?;
        let again = store.create_account(&identity)?;
        assert_eq!(again.credits, 2);
        Ok(())
    }

    #[test]
    fn debit_never_goes_below_zero() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = FileProfileStore::new(temp.path());
        store.create_account(&Identity::new("uid-1"))?;

        assert_eq!(store.debit_credit("uid-1")?, DebitOutcome::Debited { remaining: 2 });
        assert_eq!(store.debit_credit("uid-1")?, DebitOutcome::Debited { remaining: 1 });
        assert_eq!(store.debit_credit("uid-1")?, DebitOutcome::Debited { remaining: 0 });
        assert_eq!(store.debit_credit("uid-1")?, DebitOutcome::Insufficient);
        assert_eq!(store.fetch_account("uid-1")?.map(|a| a.credits), Some(0));
        Ok(())
    }

    #[test]
    fn separate_store_handles_spend_each_credit_once() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let first = Arc::new(FileProfileStore::new(temp.path()));
        let second = Arc::new(FileProfileStore::new(temp.path()));
        first.create_account(&Identity::new("uid-1"))?;

        let barrier = Arc::new(Barrier::new(8));
        let handles = (0..8)
            .map(|idx| {
                let store = if idx % 2 == 0 {
                    Arc::clone(&first)
                } else {
                    Arc::clone(&second)
                };
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let outcome = store.debit_credit("uid-1");
                    let seen = store.fetch_account("uid-1");
                    (outcome, seen)
                })
            })
            .collect::<Vec<_>>();

        let mut debited = 0;
        for handle in handles {
            let Ok((outcome, seen)) = handle.join() else {
                anyhow::bail!("debit thread panicked");
            };
            if let DebitOutcome::Debited { .. } = outcome? {
                debited += 1;
            }
            assert!(seen?.is_some());
        }
        assert_eq!(debited, 3);
        assert_eq!(second.fetch_account("uid-1")?.map(|a| a.credits), Some(0));
        Ok(())
    }

    #[test]
    fn debit_without_account_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = FileProfileStore::new(temp.path());
        assert!(store.debit_credit("ghost").is_err());
        Ok(())
    }

    #[test]
    fn generations_append_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = FileProfileStore::new(temp.path());
        assert!(store.list_generations("uid-1")?.is_empty());

        let refs = ["a-01".to_string(), "a-02".to_string()];
        let first = store.append_generation("uid-1", "koi", &refs)?;
        let second = store.append_generation("uid-1", "peonies", &["b-01".to_string()])?;
        assert_ne!(first.record_id, second.record_id);

        let history = store.list_generations("uid-1")?;
        assert_eq!(history, vec![first, second]);
        assert_eq!(history[0].image_refs.len(), 2);
        Ok(())
    }

    #[test]
    fn provider_style_uids_are_stored_under_hashed_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = FileProfileStore::new(temp.path());
        for uid in ["google-oauth2|1234", "../escape", "a/b", "名前"] {
            let account = store.create_account(&Identity::new(uid))?;
            assert_eq!(account.uid, uid);
            assert_eq!(store.debit_credit(uid)?, DebitOutcome::Debited { remaining: 2 });
            store.append_generation(uid, "koi", &[])?;
            assert_eq!(store.list_generations(uid)?.len(), 1);
        }
        assert!(!temp.path().join("escape.json").exists());
        for entry in std::fs::read_dir(temp.path().join("users"))? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            let stem = name.split('.').next().unwrap_or_default();
            assert_eq!(stem.len(), 64, "{name}");
            assert!(stem.chars().all(|ch| ch.is_ascii_hexdigit()), "{name}");
            assert!(!name.ends_with(".tmp"), "{name}");
        }
        assert!(store.fetch_account("").is_err());
        Ok(())
    }
}
