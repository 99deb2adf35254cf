use std::time::Duration;

use serde_json::json;

/// Summary of a provisioning run, printed as JSON on success.
#[derive(Debug)]
pub struct Report {
    pub stages_performed: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
    pub location: String,
}

impl Report {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "stagesPerformed": self.stages_performed,
            "warnings": self.warnings,
            "elapsedTime": self.duration,
            "location": self.location,
        })
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}
