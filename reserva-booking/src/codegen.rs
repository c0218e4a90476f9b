use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use reserva_domain::BookingTx;
use reserva_store::BookingRules;

use crate::error::BookingError;

/// Draws short confirmation codes (fixed prefix + fixed-width numeral)
/// and checks tenant-wide uniqueness inside the caller's transaction,
/// so concurrent confirmations cannot race a check-then-insert. The
/// storage-layer unique constraint stays as the final backstop.
pub struct CodeGenerator {
    prefix: String,
    digits: u32,
    max_attempts: u32,
}

impl CodeGenerator {
    pub fn new(prefix: impl Into<String>, digits: u32, max_attempts: u32) -> Self {
        Self {
            prefix: prefix.into(),
            digits,
            max_attempts,
        }
    }

    pub fn from_rules(rules: &BookingRules) -> Self {
        Self::new(
            rules.code_prefix.clone(),
            rules.code_digits,
            rules.code_max_attempts,
        )
    }

    fn draw(&self) -> String {
        let span = 10u64.pow(self.digits);
        let numeral = rand::thread_rng().gen_range(0..span);
        format!(
            "{}{:0width$}",
            self.prefix,
            numeral,
            width = self.digits as usize
        )
    }

    pub async fn generate(
        &self,
        tx: &mut dyn BookingTx,
        tenant_id: Uuid,
    ) -> Result<String, BookingError> {
        for attempt in 1..=self.max_attempts {
            let code = self.draw();
            if !tx.code_exists(tenant_id, &code).await? {
                if attempt > 1 {
                    debug!(attempt, "confirmation code drawn after collision");
                }
                return Ok(code);
            }
        }
        Err(BookingError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}
