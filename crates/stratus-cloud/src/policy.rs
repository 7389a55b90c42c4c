//! Policy documents
//!
//! The shared policy document attached to an encryption key (and the
//! assume-role documents on roles) serialize in the control plane's
//! PascalCase JSON shape. `Principal.AWS` and `Action` may arrive as a
//! scalar or a list; both normalize to lists here.

use serde::{Deserialize, Serialize};

/// A full policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,

    #[serde(rename = "Statement")]
    pub statement: Vec<PolicyStatement>,
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    #[serde(rename = "Effect")]
    pub effect: String,

    #[serde(rename = "Principal", default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,

    #[serde(rename = "Action", with = "string_or_list")]
    pub action: Vec<String>,

    #[serde(rename = "Resource", default, with = "string_or_list")]
    pub resource: Vec<String>,

    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

/// Statement principal; only account principals are modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "AWS", default, with = "string_or_list")]
    pub aws: Vec<String>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: "2012-10-17".to_string(),
            statement,
        }
    }

    pub fn statement_mut(&mut self, sid: &str) -> Option<&mut PolicyStatement> {
        self.statement
            .iter_mut()
            .find(|s| s.sid.as_deref() == Some(sid))
    }

    /// Drop principals that no longer resolve to an identity. Deleting a
    /// role referenced by a policy turns its ARN into an opaque internal
    /// id, which would fail validation if written back.
    pub fn drop_invalid_principals(&mut self) {
        for statement in &mut self.statement {
            if let Some(principal) = &mut statement.principal {
                principal.aws.retain(|arn| arn.starts_with("arn:"));
            }
        }
    }
}

impl PolicyStatement {
    pub fn allow(sid: impl Into<String>, principals: Vec<String>, action: Vec<String>) -> Self {
        Self {
            sid: Some(sid.into()),
            effect: "Allow".to_string(),
            principal: Some(Principal { aws: principals }),
            action,
            resource: vec!["*".to_string()],
            condition: None,
        }
    }
}

/// Serde adapter for fields that may be a single string or a list.
mod string_or_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Vec<String>, serializer: S) -> Result<S::Ok, S::Error> {
        if value.len() == 1 {
            value[0].serialize(serializer)
        } else {
            value.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(list) => list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_principal_normalizes_to_list() {
        let doc: PolicyDocument = serde_json::from_value(serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "Allow use of the key",
                "Effect": "Allow",
                "Principal": {"AWS": "arn:aws:iam::123:role/app"},
                "Action": ["kms:Decrypt"],
                "Resource": "*"
            }]
        }))
        .unwrap();
        assert_eq!(
            doc.statement[0].principal.as_ref().unwrap().aws,
            vec!["arn:aws:iam::123:role/app"]
        );
        assert_eq!(doc.statement[0].resource, vec!["*"]);
    }

    #[test]
    fn invalid_principals_are_dropped() {
        let mut doc = PolicyDocument::new(vec![PolicyStatement::allow(
            "Allow use of the key",
            vec![
                "arn:aws:iam::123:role/app".to_string(),
                "AROAEXAMPLEORPHAN".to_string(),
            ],
            vec!["kms:Decrypt".to_string()],
        )]);
        doc.drop_invalid_principals();
        assert_eq!(
            doc.statement[0].principal.as_ref().unwrap().aws,
            vec!["arn:aws:iam::123:role/app"]
        );
    }

    #[test]
    fn statement_lookup_by_sid() {
        let mut doc = PolicyDocument::new(vec![PolicyStatement::allow(
            "Enable IAM User Permissions",
            vec!["arn:aws:iam::123:root".to_string()],
            vec!["kms:*".to_string()],
        )]);
        assert!(doc.statement_mut("Enable IAM User Permissions").is_some());
        assert!(doc.statement_mut("missing").is_none());
    }

    #[test]
    fn roundtrip_keeps_condition() {
        let json = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "Allow attachment of persistent resources",
                "Effect": "Allow",
                "Principal": {"AWS": ["arn:aws:iam::123:root"]},
                "Action": ["kms:CreateGrant"],
                "Resource": "*",
                "Condition": {"Bool": {"kms:GrantIsForAWSResource": true}}
            }]
        });
        let doc: PolicyDocument = serde_json::from_value(json).unwrap();
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            back["Statement"][0]["Condition"]["Bool"]["kms:GrantIsForAWSResource"],
            serde_json::json!(true)
        );
    }
}
