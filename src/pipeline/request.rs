//! Transient request / result types of the apply workflow.
//!
//! Field names follow the JSON wire format of the `POST /sc/apply` surface:
//! a list of `{"word_list": [...], "sound_changes_id": n}` in, and
//! `{"output": [...]}` out.

use serde::{Deserialize, Serialize};

/// One batch: apply rule-set `rule_set_id` to `word_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRequest {
    pub word_list: Vec<String>,
    #[serde(rename = "sound_changes_id", alias = "rule_set_id")]
    pub rule_set_id: u64,
}

impl ApplicationRequest {
    pub fn new<I, S>(rule_set_id: u64, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            word_list: words.into_iter().map(Into::into).collect(),
            rule_set_id,
        }
    }
}

/// Output lines of every batch, in request order then word order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub output: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_reads_wire_field_name() {
        let req: ApplicationRequest =
            serde_json::from_str(r#"{"sound_changes_id": 3, "word_list": ["test"]}"#).unwrap();
        assert_eq!(req, ApplicationRequest::new(3, ["test"]));
    }

    #[test]
    fn request_accepts_rule_set_id_alias() {
        let req: ApplicationRequest =
            serde_json::from_str(r#"{"rule_set_id": 3, "word_list": []}"#).unwrap();
        assert_eq!(req.rule_set_id, 3);
        assert!(req.word_list.is_empty());
    }

    #[test]
    fn result_serialises_as_output_object() {
        let result = ApplicationResult {
            output: vec!["tast".into()],
        };
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"output":["tast"]}"#
        );
    }
}
