//! Identifying metadata for one inspection.

use serde::{Deserialize, Serialize};

/// The setup record written once at the start of an assessment session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentSetup {
    /// Name of the inspected site.
    pub site_name: String,
    /// Site representative accompanying the inspection.
    pub representative: String,
    /// Date of the assessment, usually `YYYY-MM-DD`.
    pub assessment_date: String,
    /// Whether it was safe to enter the site.
    pub safety_entry: bool,
    /// Why entry was declined, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
}

impl AssessmentSetup {
    /// Site name, or `None` when blank.
    #[must_use]
    pub fn site(&self) -> Option<&str> {
        let site = self.site_name.trim();
        (!site.is_empty()).then_some(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case_round_trip() {
        let setup = AssessmentSetup {
            site_name: "North Substation".to_string(),
            representative: "J. Okafor".to_string(),
            assessment_date: "2024-03-02".to_string(),
            safety_entry: false,
            decline_reason: Some("Flooded basement".to_string()),
        };
        let value = serde_json::to_value(&setup).unwrap();
        assert_eq!(value["siteName"], "North Substation");
        assert_eq!(value["declineReason"], "Flooded basement");

        let back: AssessmentSetup = serde_json::from_value(value).unwrap();
        assert_eq!(back, setup);
    }

    #[test]
    fn test_partial_record_uses_defaults() {
        let setup: AssessmentSetup = serde_json::from_value(json!({"siteName": "Depot"})).unwrap();
        assert_eq!(setup.site(), Some("Depot"));
        assert!(!setup.safety_entry);
        assert!(setup.decline_reason.is_none());
    }

    #[test]
    fn test_blank_site() {
        let setup = AssessmentSetup {
            site_name: "  ".to_string(),
            ..AssessmentSetup::default()
        };
        assert_eq!(setup.site(), None);
    }
}
