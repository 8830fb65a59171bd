use crate::money::Money;
use thiserror::Error;
use uuid::Uuid;

/// A rule about account totals that a mutation would break.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceViolation {
    #[error("Cash account cannot have a negative posted balance")]
    NegativeCashBalance { account: Uuid },

    #[error("Creditor account cannot have credits less than debits")]
    CreditorCreditsBelowDebits { account: Uuid },

    #[error("This transfer would cause credit card to have credits less than debits")]
    CreditCardWouldGoNegative { account: Uuid },

    #[error("Insufficient funds: balance {available} cannot cover {requested}")]
    InsufficientFunds {
        account: Uuid,
        available: Money,
        requested: Money,
    },

    #[error("Account totals cannot be negative")]
    NegativeTotal { account: Uuid },

    #[error("Account totals would exceed the largest representable amount")]
    TotalOutOfRange { account: Uuid },
}

impl BalanceViolation {
    pub fn account(&self) -> Uuid {
        match self {
            BalanceViolation::NegativeCashBalance { account }
            | BalanceViolation::CreditorCreditsBelowDebits { account }
            | BalanceViolation::CreditCardWouldGoNegative { account }
            | BalanceViolation::InsufficientFunds { account, .. }
            | BalanceViolation::NegativeTotal { account }
            | BalanceViolation::TotalOutOfRange { account } => *account,
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Balance(#[from] BalanceViolation),

    #[error("Posted transfers cannot be modified")]
    PostedImmutable,

    #[error("Transfer {0} is not pending")]
    NotPending(Uuid),

    #[error("No such {entity}: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::Validation(vec![message.into()])
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        LedgerError::NotFound { entity, id }
    }

    /// Storage failures are exceptional; everything else is a rule the caller broke.
    pub fn is_storage(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }

    /// Validation messages, if this is a validation failure.
    pub fn messages(&self) -> &[String] {
        match self {
            LedgerError::Validation(msgs) => msgs,
            _ => &[],
        }
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Collects validation messages the way a form would, then fails once.
#[derive(Debug, Default)]
pub(crate) struct Errors(Vec<String>);

impl Errors {
    pub(crate) fn add(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub(crate) fn check(&mut self, ok: bool, message: &str) {
        if !ok {
            self.add(message);
        }
    }

    pub(crate) fn finish(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(self.0))
        }
    }
}
