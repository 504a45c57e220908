//! Feature policy deciding which transformations run on a record.

use crate::record::Record;
use crate::transform::{PatternTransformer, PayloadTransformer};

/// Feature toggles, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Strip leading zeros from numeric `Patient_ID` attributes
    pub remove_patient_id_leading_zeros: bool,

    /// Drop every record that is not an oBDS 2.x document
    pub drop_non_obds2: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            remove_patient_id_leading_zeros: true,
            drop_non_obds2: false,
        }
    }
}

/// Outcome of evaluating the policy for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Record must not be forwarded
    Drop,
    /// Record is forwarded; `modified` tells whether the payload changed
    Keep { modified: bool },
}

/// Applies the enabled transformations in a fixed order:
/// the drop check first, on the unmodified payload, then the mutations.
pub struct FeaturePolicy {
    flags: FeatureFlags,
    transformer: Box<dyn PayloadTransformer>,
}

impl FeaturePolicy {
    /// Create a policy backed by the regex transformer
    pub fn new(flags: FeatureFlags) -> Self {
        Self::with_transformer(flags, Box::new(PatternTransformer))
    }

    /// Create a policy with a custom payload transformer
    pub fn with_transformer(flags: FeatureFlags, transformer: Box<dyn PayloadTransformer>) -> Self {
        Self { flags, transformer }
    }

    /// Evaluate the policy, mutating the record in place when it is kept
    pub fn apply(&self, record: &mut Record) -> Verdict {
        if self.flags.drop_non_obds2 && !self.transformer.is_obds_version_2x(&record.payload) {
            return Verdict::Drop;
        }

        let mut modified = false;
        if self.flags.remove_patient_id_leading_zeros {
            modified |= self
                .transformer
                .remove_leading_patient_id_zeros(&mut record.payload);
        }

        Verdict::Keep { modified }
    }
}

impl Default for FeaturePolicy {
    fn default() -> Self {
        Self::new(FeatureFlags::default())
    }
}
