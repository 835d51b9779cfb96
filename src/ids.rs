//! Identifier generation.
//!
//! Task/flow ids take the shape `<prefix>-<12hex>` (§8 E1): a human-legible
//! prefix plus enough random hex to make collision practically impossible
//! without pulling in a sequence generator the store doesn't otherwise need.

use uuid::Uuid;

pub fn generate(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_expected_shape() {
        let id = generate("task");
        assert!(id.starts_with("task-"));
        assert_eq!(id.len(), "task-".len() + 12);
    }

    #[test]
    fn generated_ids_are_not_equal() {
        assert_ne!(generate("task"), generate("task"));
    }
}
