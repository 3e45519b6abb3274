//! Vagueness gate

use nt_core::{FilterObject, NtError, Result};

/// Reject a filter with every field absent; pass anything else through
pub fn gate(filter: FilterObject) -> Result<FilterObject> {
    if filter.is_empty() {
        Err(NtError::VagueQuery)
    } else {
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_is_rejected() {
        assert!(matches!(gate(FilterObject::default()), Err(NtError::VagueQuery)));
    }

    #[test]
    fn test_populated_filter_passes_unchanged() {
        let filter = FilterObject::for_invoice(54321);
        assert_eq!(gate(filter.clone()).unwrap(), filter);
    }
}
