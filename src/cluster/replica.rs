//! Replica sets reported by cluster members.

use crate::protocol::ReplicaInfo;

/// Every replica of one database, as last reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseReplicas {
    name: String,
    replicas: Vec<ReplicaInfo>,
}

impl DatabaseReplicas {
    pub fn new(name: impl Into<String>, replicas: Vec<ReplicaInfo>) -> Self {
        Self {
            name: name.into(),
            replicas,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replicas(&self) -> &[ReplicaInfo] {
        &self.replicas
    }

    /// The replica flagged primary with the highest term.
    ///
    /// Two replicas can both claim to be primary across an election; the
    /// higher term wins.
    pub fn primary(&self) -> Option<&ReplicaInfo> {
        self.replicas
            .iter()
            .filter(|replica| replica.is_primary)
            .max_by_key(|replica| replica.term)
    }

    /// The replica this client should prefer for reads.
    pub fn preferred(&self) -> Option<&ReplicaInfo> {
        self.replicas.iter().find(|replica| replica.is_preferred)
    }

    /// Preferred replica first, then the rest in reported order.
    pub fn read_order(&self) -> Vec<&ReplicaInfo> {
        let preferred = self.preferred();
        let mut ordered: Vec<&ReplicaInfo> = preferred.into_iter().collect();
        ordered.extend(
            self.replicas
                .iter()
                .filter(|replica| Some(*replica) != preferred),
        );
        ordered
    }
}
