//! # Payment Attribution
//!
//! Decides which household member paid for a receipt, based on the payment
//! label printed on it.
//!
//! ## Resolution Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  label missing ──interactive──► PayerPrompt::ask_payment_name          │
//! │       │                              └── none ──────────► Declined     │
//! │       └──batch/upload─────────────────────────────────► Unassigned     │
//! │                                                                         │
//! │  label on ignore list ─────────────────────────────────► Ignored       │
//! │  label mapped ─────────────────────────────────────────► Member        │
//! │  label unknown                                                         │
//! │       ├──interactive──► PayerPrompt::choose_member                     │
//! │       │                     ├── member / Other ──► record ► Member     │
//! │       │                     └── none ──────────────────► Declined      │
//! │       └──batch/upload──────────────────────────────────► Unassigned    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unassigned receipts keep the literal label and show up in
//! `PaymentRepository::unassigned_payment_names` until someone assigns it.

use std::fmt;
use std::sync::Arc;

use paragon_core::User;
use paragon_db::Database;
use tracing::{debug, info, warn};

use crate::error::IngestResult;

// =============================================================================
// Prompt
// =============================================================================

/// Asks the operator about payment labels the database does not know.
///
/// Implemented by the terminal front end. Both methods may block.
pub trait PayerPrompt: Send + Sync {
    /// The receipt has no payment label. `None` skips the receipt.
    fn ask_payment_name(&self, source: &str) -> IngestResult<Option<String>>;

    /// Picks the owner of `payment_name` among `members` (sentinel "Other"
    /// last). `None` skips the receipt.
    fn choose_member(&self, payment_name: &str, members: &[User]) -> IngestResult<Option<i64>>;
}

// =============================================================================
// Resolution
// =============================================================================

/// Outcome of [`PaymentResolver::resolve_payer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayerResolution {
    /// The label belongs to a member (possibly the "Other" member).
    Member { payment_name: String, user: User },
    /// The label is on the ignore list; skip the receipt.
    Ignored { payment_name: String },
    /// Nobody owns the label yet; store the receipt anyway.
    Unassigned { payment_name: Option<String> },
    /// The operator chose not to process this receipt.
    Declined,
}

impl PayerResolution {
    /// The label to store on the receipt.
    pub fn payment_name(&self) -> Option<&str> {
        match self {
            PayerResolution::Member { payment_name, .. }
            | PayerResolution::Ignored { payment_name } => Some(payment_name),
            PayerResolution::Unassigned { payment_name } => payment_name.as_deref(),
            PayerResolution::Declined => None,
        }
    }

    /// True when the receipt was paid by someone outside the household.
    pub fn is_not_our_receipt(&self) -> bool {
        matches!(self, PayerResolution::Member { user, .. } if user.is_other)
    }
}

/// Resolves payment labels against the household directory.
#[derive(Clone)]
pub struct PaymentResolver {
    db: Database,
    prompt: Option<Arc<dyn PayerPrompt>>,
}

impl fmt::Debug for PaymentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentResolver")
            .field("interactive", &self.is_interactive())
            .finish()
    }
}

impl PaymentResolver {
    /// Creates a non-interactive resolver.
    pub fn new(db: Database) -> Self {
        PaymentResolver { db, prompt: None }
    }

    /// Creates a resolver that asks `prompt` about unknown labels.
    pub fn interactive(db: Database, prompt: Arc<dyn PayerPrompt>) -> Self {
        PaymentResolver {
            db,
            prompt: Some(prompt),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.prompt.is_some()
    }

    /// Resolves the payer for a receipt.
    ///
    /// ## Arguments
    /// * `payment_name` - Label from the receipt, if any
    /// * `source` - File name or upload id, shown when prompting
    ///
    /// ## Errors
    /// Database and prompt I/O errors. An unknown label is not an error.
    pub async fn resolve_payer(
        &self,
        payment_name: Option<&str>,
        source: &str,
    ) -> IngestResult<PayerResolution> {
        let payment_name = match payment_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                warn!(source = %source, "Receipt has no payment name");
                let Some(prompt) = &self.prompt else {
                    return Ok(PayerResolution::Unassigned { payment_name: None });
                };
                match prompt.ask_payment_name(source)? {
                    Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                    _ => {
                        info!(source = %source, "No payment name provided, skipping receipt");
                        return Ok(PayerResolution::Declined);
                    }
                }
            }
        };

        let payments = self.db.payments();

        if payments.is_ignored(&payment_name).await? {
            info!(payment_name = %payment_name, "Payment name is on the ignore list");
            return Ok(PayerResolution::Ignored { payment_name });
        }

        if let Some(user) = payments.find_user_for_payment(&payment_name).await? {
            debug!(payment_name = %payment_name, user_id = user.user_id, "Known payment name");
            return Ok(PayerResolution::Member { payment_name, user });
        }

        let Some(prompt) = &self.prompt else {
            debug!(payment_name = %payment_name, "Unknown payment name left unassigned");
            return Ok(PayerResolution::Unassigned {
                payment_name: Some(payment_name),
            });
        };

        let members = self.db.users().list_users().await?;
        let Some(chosen) = prompt.choose_member(&payment_name, &members)? else {
            info!(payment_name = %payment_name, "Assignment declined, skipping receipt");
            return Ok(PayerResolution::Declined);
        };

        let user = self.record_mapping(&payment_name, chosen).await?;
        Ok(PayerResolution::Member { payment_name, user })
    }

    /// Persists `payment_name → user_id` for future receipts.
    ///
    /// ## Returns
    /// The member that owns the label afterwards. If another writer mapped
    /// it first, that member wins and is returned.
    pub async fn record_mapping(&self, payment_name: &str, user_id: i64) -> IngestResult<User> {
        let owner = self
            .db
            .payments()
            .insert_user_payment(payment_name, user_id)
            .await?;
        if owner != user_id {
            warn!(payment_name = %payment_name, requested = user_id, owner, "Payment name already mapped");
        }

        let user = self
            .db
            .users()
            .get_by_id(owner)
            .await?
            .ok_or_else(|| paragon_db::DbError::not_found("User", owner.to_string()))?;

        info!(payment_name = %payment_name, user_id = user.user_id, "Saved payment mapping");
        Ok(user)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use paragon_db::DbConfig;
    use std::sync::Mutex;

    /// Prompt that replays canned answers and records what it was asked.
    #[derive(Default)]
    pub(crate) struct ScriptedPrompt {
        pub names: Mutex<Vec<Option<String>>>,
        pub choices: Mutex<Vec<Option<i64>>>,
        pub asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompt {
        pub fn choosing(choices: Vec<Option<i64>>) -> Self {
            ScriptedPrompt {
                choices: Mutex::new(choices),
                ..Default::default()
            }
        }
    }

    impl PayerPrompt for ScriptedPrompt {
        fn ask_payment_name(&self, source: &str) -> IngestResult<Option<String>> {
            self.asked.lock().unwrap().push(format!("name:{}", source));
            Ok(self.names.lock().unwrap().pop().flatten())
        }

        fn choose_member(&self, payment_name: &str, members: &[User]) -> IngestResult<Option<i64>> {
            assert!(members.last().is_some_and(|m| m.is_other));
            self.asked.lock().unwrap().push(format!("member:{}", payment_name));
            Ok(self.choices.lock().unwrap().pop().flatten())
        }
    }

    async fn household() -> (Database, User, User) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ania = db.users().add_user("Ania").await.unwrap();
        db.users().add_user("Tomek").await.unwrap();
        let other = db.users().ensure_other_user().await.unwrap();
        (db, ania, other)
    }

    #[tokio::test]
    async fn test_known_mapping() {
        let (db, ania, _) = household().await;
        db.payments().insert_user_payment("Karta", ania.user_id).await.unwrap();

        let resolver = PaymentResolver::new(db);
        let resolution = resolver.resolve_payer(Some(" Karta "), "r.json").await.unwrap();

        assert_eq!(
            resolution,
            PayerResolution::Member {
                payment_name: "Karta".into(),
                user: ania
            }
        );
        assert!(!resolution.is_not_our_receipt());
    }

    #[tokio::test]
    async fn test_ignored_wins_over_mapping() {
        let (db, ania, _) = household().await;
        db.payments().insert_user_payment("Bon", ania.user_id).await.unwrap();
        db.payments().add_ignored("Bon").await.unwrap();

        let resolver = PaymentResolver::new(db);
        assert_eq!(
            resolver.resolve_payer(Some("Bon"), "r.json").await.unwrap(),
            PayerResolution::Ignored {
                payment_name: "Bon".into()
            }
        );
    }

    #[tokio::test]
    async fn test_non_interactive_unknown_is_unassigned() {
        let (db, _, _) = household().await;
        let resolver = PaymentResolver::new(db.clone());

        let resolution = resolver.resolve_payer(Some("Karta X"), "r.json").await.unwrap();
        assert_eq!(resolution.payment_name(), Some("Karta X"));
        assert!(matches!(resolution, PayerResolution::Unassigned { .. }));

        let missing = resolver.resolve_payer(None, "r.json").await.unwrap();
        assert_eq!(missing, PayerResolution::Unassigned { payment_name: None });

        // Nothing was recorded.
        assert_eq!(db.payments().find_user_for_payment("Karta X").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_interactive_assignment_is_persisted() {
        let (db, _, other) = household().await;
        let prompt = Arc::new(ScriptedPrompt::choosing(vec![Some(other.user_id)]));
        let resolver = PaymentResolver::interactive(db.clone(), prompt.clone());

        let resolution = resolver.resolve_payer(Some("Karta Y"), "r.json").await.unwrap();
        assert!(resolution.is_not_our_receipt());

        // Second lookup hits the stored mapping without prompting.
        let again = resolver.resolve_payer(Some("Karta Y"), "s.json").await.unwrap();
        assert_eq!(again, resolution);
        assert_eq!(*prompt.asked.lock().unwrap(), ["member:Karta Y"]);
    }

    #[tokio::test]
    async fn test_interactive_decline() {
        let (db, _, _) = household().await;
        let prompt = Arc::new(ScriptedPrompt::choosing(vec![None]));
        let resolver = PaymentResolver::interactive(db.clone(), prompt);

        assert_eq!(
            resolver.resolve_payer(Some("Karta Z"), "r.json").await.unwrap(),
            PayerResolution::Declined
        );
        assert_eq!(db.payments().find_user_for_payment("Karta Z").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_interactive_missing_name() {
        let (db, ania, _) = household().await;
        db.payments().insert_user_payment("Gotówka", ania.user_id).await.unwrap();

        let prompt = Arc::new(ScriptedPrompt {
            names: Mutex::new(vec![None, Some("Gotówka".into())]),
            ..Default::default()
        });
        let resolver = PaymentResolver::interactive(db, prompt);

        // Answers are popped from the back.
        let first = resolver.resolve_payer(None, "a.json").await.unwrap();
        assert_eq!(first.payment_name(), Some("Gotówka"));
        let second = resolver.resolve_payer(Some("  "), "b.json").await.unwrap();
        assert_eq!(second, PayerResolution::Declined);
    }

    #[tokio::test]
    async fn test_record_mapping_returns_existing_owner() {
        let (db, ania, other) = household().await;
        let resolver = PaymentResolver::new(db);

        let first = resolver.record_mapping("Karta", ania.user_id).await.unwrap();
        let second = resolver.record_mapping("Karta", other.user_id).await.unwrap();
        assert_eq!(first, ania);
        assert_eq!(second, ania);
    }
}
