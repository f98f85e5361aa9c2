//! Node filter grammar: `(<role>|all|loadbalancer|server|agent)(:<index>|:*)?`
//! with `;`-separated alternatives (§4.1, §6 "nodeFilters").
//!
//! A filter resolves against a concrete node list at transform/apply time,
//! never eagerly — the same filter string can match different nodes before
//! and after scale operations.

use crate::domain::role::Role;
use crate::domain::node::Node;

use super::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum RoleSelector {
    All,
    Role(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IndexSelector {
    All,
    One(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FilterClause {
    role: RoleSelector,
    index: IndexSelector,
}

/// A parsed `nodeFilters` entry: one or more `;`-separated clauses, any of
/// which may match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFilter {
    raw: String,
    clauses: Vec<FilterClause>,
}

impl NodeFilter {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw_owned = raw.to_string();
        let mut clauses = Vec::new();
        for clause in raw.split(';') {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(ConfigError::InvalidNodeFilter(
                    raw_owned,
                    "empty clause".to_string(),
                ));
            }
            let (role_part, index_part) = match clause.split_once(':') {
                Some((r, i)) => (r, Some(i)),
                None => (clause, None),
            };
            let role = match role_part {
                "all" => RoleSelector::All,
                "server" => RoleSelector::Role(Role::Server),
                "agent" => RoleSelector::Role(Role::Agent),
                "loadbalancer" => RoleSelector::Role(Role::LoadBalancer),
                "registry" => RoleSelector::Role(Role::Registry),
                other => {
                    return Err(ConfigError::InvalidNodeFilter(
                        raw_owned,
                        format!("unknown role {other:?}"),
                    ))
                }
            };
            let index = match index_part {
                None => IndexSelector::All,
                Some("*") => IndexSelector::All,
                Some(n) => {
                    let parsed = n.parse::<usize>().map_err(|_| {
                        ConfigError::InvalidNodeFilter(
                            raw_owned.clone(),
                            format!("invalid index {n:?}"),
                        )
                    })?;
                    IndexSelector::One(parsed)
                }
            };
            if role == RoleSelector::All && matches!(index, IndexSelector::One(_)) {
                return Err(ConfigError::InvalidNodeFilter(
                    raw_owned,
                    "\"all\" does not support an index".to_string(),
                ));
            }
            clauses.push(FilterClause { role, index });
        }
        Ok(NodeFilter {
            raw: raw_owned,
            clauses,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve against a node list, grouping candidates by role before
    /// applying the `:index` ordinal within that role's members.
    pub fn resolve<'a>(&self, nodes: &'a [Node]) -> Result<Vec<&'a Node>, ConfigError> {
        let mut matched = Vec::new();
        for clause in &self.clauses {
            let candidates: Vec<&Node> = match &clause.role {
                RoleSelector::All => nodes.iter().collect(),
                RoleSelector::Role(role) => {
                    nodes.iter().filter(|n| n.role == *role).collect()
                }
            };
            match clause.index {
                IndexSelector::All => matched.extend(candidates),
                IndexSelector::One(i) => {
                    if let Some(node) = candidates.get(i) {
                        matched.push(*node);
                    }
                }
            }
        }
        matched.sort_by_key(|n| n.name.clone());
        matched.dedup_by_key(|n| n.name.clone());
        if matched.is_empty() {
            return Err(ConfigError::FilterNoMatch(self.raw.clone()));
        }
        Ok(matched)
    }

    /// Resolve requiring exactly one match (used for single-target
    /// operations such as the load-balancer reload exec target).
    pub fn resolve_one<'a>(&self, nodes: &'a [Node]) -> Result<&'a Node, ConfigError> {
        let matched = self.resolve(nodes)?;
        if matched.len() != 1 {
            return Err(ConfigError::FilterAmbiguous(self.raw.clone(), matched.len()));
        }
        Ok(matched[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::Node;

    fn node(name: &str, role: Role) -> Node {
        Node::new(name.to_string(), role)
    }

    #[test]
    fn resolves_all() {
        let nodes = vec![
            node("s0", Role::Server),
            node("a0", Role::Agent),
            node("a1", Role::Agent),
        ];
        let filter = NodeFilter::parse("all").unwrap();
        assert_eq!(filter.resolve(&nodes).unwrap().len(), 3);
    }

    #[test]
    fn resolves_role_with_index() {
        let nodes = vec![node("a0", Role::Agent), node("a1", Role::Agent)];
        let filter = NodeFilter::parse("agent:1").unwrap();
        let matched = filter.resolve(&nodes).unwrap();
        assert_eq!(matched, vec![&nodes[1]]);
    }

    #[test]
    fn resolves_multiple_clauses() {
        let nodes = vec![node("s0", Role::Server), node("lb", Role::LoadBalancer)];
        let filter = NodeFilter::parse("server;loadbalancer").unwrap();
        assert_eq!(filter.resolve(&nodes).unwrap().len(), 2);
    }

    #[test]
    fn rejects_all_with_index() {
        assert!(NodeFilter::parse("all:0").is_err());
    }

    #[test]
    fn no_match_is_an_error() {
        let nodes = vec![node("s0", Role::Server)];
        let filter = NodeFilter::parse("agent:0").unwrap();
        assert!(matches!(
            filter.resolve(&nodes),
            Err(ConfigError::FilterNoMatch(_))
        ));
    }

    #[test]
    fn resolve_one_requires_singleton() {
        let nodes = vec![node("a0", Role::Agent), node("a1", Role::Agent)];
        let filter = NodeFilter::parse("agent").unwrap();
        assert!(matches!(
            filter.resolve_one(&nodes),
            Err(ConfigError::FilterAmbiguous(_, 2))
        ));
    }
}
