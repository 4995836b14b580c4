use serde::Deserialize;
use serde_json::Value;

use crate::models::{Record, RecordKind, Subscription};

use super::{Manifest, ObjectMeta};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An `operators.coreos.com/Subscription` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionManifest {
    /// The subscription metadata.
    pub metadata: ObjectMeta,

    /// The subscription spec.
    pub spec: SubscriptionSpec,

    /// The subscription status.
    pub status: SubscriptionStatus,
}

/// The subscription spec.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// The subscribed package.
    #[serde(rename = "name")]
    pub package: String,

    /// The catalog source.
    pub source: String,

    /// The catalog source namespace.
    pub source_namespace: String,

    /// The CSV to start from.
    #[serde(rename = "startingCSV")]
    pub starting_csv: String,
}

/// The subscription status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// The current CSV.
    #[serde(rename = "currentCSV")]
    pub current_csv: String,

    /// The installed CSV.
    #[serde(rename = "installedCSV")]
    pub installed_csv: String,

    /// The subscription state.
    pub state: String,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Manifest for SubscriptionManifest {
    const KIND: RecordKind = RecordKind::Subscription;

    fn into_record(self, content: Value) -> Result<Record, String> {
        Ok(Record::Subscription(Subscription {
            uuid: self.metadata.required_uid()?,
            name: self.spec.package,
            namespace: self.metadata.namespace(),
            source: self.spec.source,
            source_namespace: self.spec.source_namespace,
            starting_csv: self.spec.starting_csv,
            current_csv: self.status.current_csv,
            installed_csv: self.status.installed_csv,
            state: self.status.state,
            creation_time: self.metadata.creation_timestamp,
            content,
        }))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::manifest::decode_manifests;

    #[test]
    fn test_subscription_summary_fields() -> anyhow::Result<()> {
        let yaml = r#"
apiVersion: operators.coreos.com/v1alpha1
kind: Subscription
metadata:
  name: hco-operatorhub
  namespace: openshift-cnv
  uid: sub-1
spec:
  name: kubevirt-hyperconverged
  source: redhat-operators
  sourceNamespace: openshift-marketplace
  startingCSV: kubevirt-hyperconverged-operator.v4.15.0
status:
  currentCSV: kubevirt-hyperconverged-operator.v4.15.1
  installedCSV: kubevirt-hyperconverged-operator.v4.15.1
  state: AtLatestKnown
"#;
        let records =
            decode_manifests::<SubscriptionManifest>(Path::new("sub.yaml"), yaml.as_bytes())?;
        let Record::Subscription(sub) = &records[0] else {
            panic!("expected a subscription record");
        };

        assert_eq!(sub.name, "kubevirt-hyperconverged");
        assert_eq!(sub.source, "redhat-operators");
        assert_eq!(sub.source_namespace, "openshift-marketplace");
        assert_eq!(sub.installed_csv, "kubevirt-hyperconverged-operator.v4.15.1");
        assert_eq!(sub.state, "AtLatestKnown");
        Ok(())
    }
}
