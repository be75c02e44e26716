//! Structured read-only queries over a class of objects.

use crate::value::PropertyMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Equals { field: String, value: String },
    Contains { field: String, value: String },
}

/// "Objects of class K where F = V [and G contains P]".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub class: String,
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn all(class: &str) -> Self {
        Self {
            class: class.to_string(),
            filters: Vec::new(),
        }
    }

    pub fn by_name(class: &str, field: &str, name: &str) -> Self {
        Self::all(class).equals(field, name)
    }

    pub fn equals(mut self, field: &str, value: &str) -> Self {
        self.filters.push(Filter::Equals {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn contains(mut self, field: &str, value: &str) -> Self {
        self.filters.push(Filter::Contains {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Render as WQL.
    pub fn to_wql(&self) -> String {
        let mut wql = format!("SELECT * FROM {}", self.class);
        for (i, filter) in self.filters.iter().enumerate() {
            wql.push_str(if i == 0 { " WHERE " } else { " AND " });
            match filter {
                Filter::Equals { field, value } => {
                    wql.push_str(&format!("{field} = '{}'", escape_literal(value)));
                }
                Filter::Contains { field, value } => {
                    wql.push_str(&format!("{field} LIKE '%{}%'", escape_like(value)));
                }
            }
        }
        wql
    }

    /// Evaluate the filters against an instance's properties.
    ///
    /// String comparison is case-insensitive, as WQL is.
    pub fn matches(&self, properties: &PropertyMap) -> bool {
        self.filters.iter().all(|filter| {
            let (field, expected) = match filter {
                Filter::Equals { field, value } | Filter::Contains { field, value } => (field, value),
            };
            let Some(actual) = properties.get(field).and_then(|v| v.to_query_text()) else {
                return false;
            };
            let actual = actual.to_lowercase();
            let expected = expected.to_lowercase();
            match filter {
                Filter::Equals { .. } => actual == expected,
                Filter::Contains { .. } => actual.contains(&expected),
            }
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wql())
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in escape_literal(value).chars() {
        match c {
            '%' | '_' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_wql_rendering() {
        let q = Query::by_name("Msvm_VirtualEthernetSwitch", "ElementName", "LAN");
        assert_eq!(q.to_wql(), "SELECT * FROM Msvm_VirtualEthernetSwitch WHERE ElementName = 'LAN'");

        let q = Query::by_name("Msvm_SyntheticEthernetPortSettingData", "ElementName", "nic0")
            .contains("InstanceID", "ABCD");
        assert_eq!(
            q.to_wql(),
            "SELECT * FROM Msvm_SyntheticEthernetPortSettingData WHERE ElementName = 'nic0' AND InstanceID LIKE '%ABCD%'"
        );
    }

    #[test]
    fn test_wql_escapes_quotes_and_wildcards() {
        let q = Query::by_name("Msvm_ComputerSystem", "ElementName", "bob's vm");
        assert_eq!(q.to_wql(), "SELECT * FROM Msvm_ComputerSystem WHERE ElementName = 'bob\\'s vm'");

        let q = Query::all("CIM_DataFile").contains("Name", "C:\\disk_1");
        assert_eq!(q.to_wql(), "SELECT * FROM CIM_DataFile WHERE Name LIKE '%C:\\\\disk[_]1%'");
    }

    #[test]
    fn test_matches() {
        let mut props = PropertyMap::new();
        props.insert("ElementName".into(), Value::from("Web-01"));
        props.insert("InstanceID".into(), Value::from("Microsoft:1234\\5678"));
        props.insert("EnabledState".into(), Value::from(2u16));

        assert!(Query::by_name("X", "ElementName", "web-01").matches(&props));
        assert!(Query::all("X").contains("InstanceID", "1234").matches(&props));
        assert!(Query::all("X").equals("EnabledState", "2").matches(&props));
        assert!(!Query::by_name("X", "ElementName", "web-02").matches(&props));
        assert!(!Query::by_name("X", "Caption", "Virtual Machine").matches(&props));
    }
}
