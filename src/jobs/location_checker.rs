//! Read-only diagnosis of location conflicts and broken hierarchies.

use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::JobContext;
use crate::nautobot::{NbLocation, NbLocationType};

/// Names that earlier lab setups left behind and that collide with new sites
const CONFLICTING_NAMES: &[&str] = &["Test Data Center", "Main Lab", "Default", "Site"];

const ALTERNATIVE_NAMES: &[&str] = &[
    "Lab Environment",
    "Demo Network",
    "Training Lab",
    "Containerlab Demo",
    "Network Automation Lab",
];

#[derive(Debug, Clone)]
pub struct Options {
    pub check_existing: bool,
    pub check_hierarchy: bool,
    pub suggest_cleanup: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { check_existing: true, check_hierarchy: true, suggest_cleanup: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyIssue {
    pub location: String,
    pub problem: String,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub locations: Vec<String>,
    pub conflicts: Vec<String>,
    pub issues: Vec<HierarchyIssue>,
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Report> {
    tracing::info!("Starting location checker...");
    let mut report = Report::default();

    let locations = if opts.check_existing || opts.check_hierarchy {
        ctx.nautobot.list_locations().await.map_err(|e| {
            tracing::error!("Error during location check: {}", e);
            e
        })?
    } else {
        Vec::new()
    };

    if opts.check_existing {
        tracing::info!("=== CHECKING EXISTING LOCATIONS ===");
        tracing::info!("Found {} locations", locations.len());
        for loc in &locations {
            let kind = loc.location_type.as_ref().map(|t| t.label()).unwrap_or("?");
            tracing::info!("- {} ({})", loc.name, kind);
            report.locations.push(loc.name.clone());
        }
        report.conflicts = conflicting_names(&locations);
        if report.conflicts.is_empty() {
            tracing::info!("No commonly conflicting location names found");
        } else {
            for name in &report.conflicts {
                tracing::warn!("Potentially conflicting location: '{}'", name);
            }
        }
    }

    if opts.check_hierarchy {
        tracing::info!("=== CHECKING LOCATION HIERARCHY ===");
        let types = ctx.nautobot.list_location_types().await?;
        report.issues = check_hierarchy(&locations, &types);
        if report.issues.is_empty() {
            tracing::info!("Location hierarchy is consistent");
        }
        for issue in &report.issues {
            tracing::warn!("{}: {}", issue.location, issue.problem);
        }
    }

    if opts.suggest_cleanup {
        tracing::info!("=== SUGGESTED CLEANUP ACTIONS ===");
        tracing::info!("To resolve location validation errors:");
        tracing::info!("1. Go to Admin -> Locations in Nautobot UI");
        tracing::info!("2. Check for existing 'Test Data Center' or similar locations");
        tracing::info!("3. Delete conflicting locations if they're not needed");
        tracing::info!("4. Use unique site names in your jobs");
        tracing::info!("5. Ensure proper location type hierarchy");
        tracing::info!("Alternative site names to try:");
        for name in ALTERNATIVE_NAMES {
            tracing::info!("- '{}'", name);
        }
    }

    tracing::info!("Location checker completed!");
    Ok(report)
}

fn conflicting_names(locations: &[NbLocation]) -> Vec<String> {
    locations
        .iter()
        .filter(|l| CONFLICTING_NAMES.iter().any(|c| c.eq_ignore_ascii_case(&l.name)))
        .map(|l| l.name.clone())
        .collect()
}

/// Parent-type mismatches, missing parents and parent cycles
pub fn check_hierarchy(locations: &[NbLocation], types: &[NbLocationType]) -> Vec<HierarchyIssue> {
    let types_by_id: HashMap<&str, &NbLocationType> = types.iter().map(|t| (t.id.as_str(), t)).collect();
    let by_id: HashMap<&str, &NbLocation> = locations.iter().map(|l| (l.id.as_str(), l)).collect();
    let mut issues = Vec::new();

    for loc in locations {
        let Some(lt) = loc.location_type.as_ref().and_then(|r| types_by_id.get(r.id.as_str())) else {
            continue;
        };
        let expected_parent_type = lt.parent.as_ref().map(|p| p.id.as_str());

        match (&loc.parent, expected_parent_type) {
            (None, Some(_)) => issues.push(HierarchyIssue {
                location: loc.name.clone(),
                problem: format!("location type {} requires a parent", lt.name),
            }),
            (Some(parent), expected) => {
                let parent_type = by_id
                    .get(parent.id.as_str())
                    .and_then(|p| p.location_type.as_ref())
                    .map(|t| t.id.as_str());
                let same_type_nesting = lt.nestable && parent_type == Some(lt.id.as_str());
                if let Some(actual) = parent_type {
                    if !same_type_nesting && expected != Some(actual) {
                        let actual_name = types_by_id.get(actual).map(|t| t.name.as_str()).unwrap_or(actual);
                        issues.push(HierarchyIssue {
                            location: loc.name.clone(),
                            problem: format!("parent has wrong type {} for location type {}", actual_name, lt.name),
                        });
                    }
                }
            }
            (None, None) => {}
        }
    }

    for loc in locations {
        let mut seen = HashSet::new();
        let mut current = Some(loc);
        while let Some(l) = current {
            if !seen.insert(l.id.as_str()) {
                issues.push(HierarchyIssue {
                    location: loc.name.clone(),
                    problem: "circular parent relationship".to_string(),
                });
                break;
            }
            current = l.parent.as_ref().and_then(|p| by_id.get(p.id.as_str()).copied());
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing;
    use crate::nautobot::NestedRef;
    use httpmock::prelude::*;

    fn nested(id: &str) -> Option<NestedRef> {
        Some(NestedRef { id: id.into(), name: None, display: None, url: None })
    }

    fn lt(id: &str, name: &str, parent: Option<&str>, nestable: bool) -> NbLocationType {
        NbLocationType {
            id: id.into(),
            name: name.into(),
            parent: parent.and_then(nested),
            nestable,
            content_types: vec![],
        }
    }

    fn loc(id: &str, name: &str, type_id: &str, parent: Option<&str>) -> NbLocation {
        NbLocation {
            id: id.into(),
            name: name.into(),
            location_type: nested(type_id),
            parent: parent.and_then(nested),
            status: None,
            description: String::new(),
        }
    }

    fn types() -> Vec<NbLocationType> {
        vec![lt("region", "Region", None, true), lt("site", "Site", Some("region"), false)]
    }

    #[test]
    fn test_consistent_hierarchy() {
        let locations = vec![
            loc("r1", "US East", "region", None),
            loc("r2", "Virginia", "region", Some("r1")),
            loc("s1", "IAD-01", "site", Some("r2")),
        ];
        assert!(check_hierarchy(&locations, &types()).is_empty());
    }

    #[test]
    fn test_wrong_parent_type_and_missing_parent() {
        let locations = vec![
            loc("r1", "US East", "region", None),
            loc("s1", "IAD-01", "site", Some("r1")),
            loc("s2", "IAD-02", "site", Some("s1")),
            loc("s3", "Orphan", "site", None),
        ];
        let issues = check_hierarchy(&locations, &types());
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].location, "IAD-02");
        assert!(issues[0].problem.contains("wrong type Site"));
        assert_eq!(issues[1].location, "Orphan");
    }

    #[test]
    fn test_cycle_detected() {
        let locations = vec![
            loc("r1", "A", "region", Some("r2")),
            loc("r2", "B", "region", Some("r1")),
        ];
        let issues = check_hierarchy(&locations, &types());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.problem == "circular parent relationship"));
    }

    #[test]
    fn test_conflicting_names() {
        let locations = vec![loc("1", "main lab", "site", None), loc("2", "Lab Environment", "site", None)];
        assert_eq!(conflicting_names(&locations), vec!["main lab".to_string()]);
    }

    #[tokio::test]
    async fn test_run_reports_existing_and_conflicts() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/locations/");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "l1", "name": "Default", "location_type": {"id": "site", "name": "Site"}},
                    {"id": "l2", "name": "US East", "location_type": {"id": "region", "name": "Region"}}
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/location-types/");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "region", "name": "Region", "nestable": true},
                    {"id": "site", "name": "Site", "parent": {"id": "region"}}
                ])));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let report = run(&ctx, &Options::default()).await.unwrap();
        assert_eq!(report.locations, vec!["Default", "US East"]);
        assert_eq!(report.conflicts, vec!["Default"]);
        assert_eq!(
            report.issues,
            vec![HierarchyIssue { location: "Default".into(), problem: "location type Site requires a parent".into() }]
        );
    }
}
