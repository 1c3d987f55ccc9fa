//! Location types, location custom fields and the top-level regions every
//! site builder run expects to find.

use anyhow::Result;
use serde::Serialize;

use super::{success, JobContext};
use crate::models::status_name;
use crate::nautobot::{CustomFieldCreate, LocationCreate, LocationTypeCreate, NbStatus};

const LOCATION_CONTENT_TYPE: &str = "dcim.location";
const CHOICE_WEIGHT: i32 = 100;

struct LocationTypeSpec {
    name: &'static str,
    nestable: bool,
    description: &'static str,
    content_types: &'static [&'static str],
}

const LOCATION_TYPES: &[LocationTypeSpec] = &[
    LocationTypeSpec {
        name: "Region",
        nestable: true,
        description: "Regional grouping",
        content_types: &[],
    },
    LocationTypeSpec {
        name: "Site",
        nestable: true,
        description: "Site location type for Nautobot sites",
        content_types: &[
            "dcim.rack",
            "dcim.device",
            "dcim.powerpanel",
            "dcim.powerfeed",
            "ipam.prefix",
            "ipam.vlan",
        ],
    },
];

struct CustomFieldSpec {
    key: &'static str,
    label: &'static str,
    field_type: &'static str,
    required: bool,
    description: &'static str,
    weight: i32,
    validation_regex: &'static str,
    choices: &'static [&'static str],
}

const CUSTOM_FIELDS: &[CustomFieldSpec] = &[
    CustomFieldSpec {
        key: "site_slug",
        label: "Site Slug",
        field_type: "text",
        required: true,
        description: "The slug for the site",
        weight: 100,
        validation_regex: "^[a-z0-9-]+$",
        choices: &[],
    },
    CustomFieldSpec {
        key: "site_code",
        label: "Site Code",
        field_type: "text",
        required: true,
        description: "Site code identifier (migrating from site_slug)",
        weight: 200,
        validation_regex: "^[A-Z0-9-]+$",
        choices: &[],
    },
    CustomFieldSpec {
        key: "site_config_type",
        label: "Site Config Selector",
        field_type: "select",
        required: false,
        description: "The type of configuration to use for the site",
        weight: 300,
        validation_regex: "",
        choices: &["v1", "v2.1", "v2.3"],
    },
    CustomFieldSpec {
        key: "site_environment",
        label: "Site Environment",
        field_type: "select",
        required: true,
        description: "The environment type for the site",
        weight: 400,
        validation_regex: "",
        choices: &["production", "staging", "development", "testing"],
    },
];

const REGIONS: &[&str] = &["US East", "US West", "Europe West", "Europe Central", "Asia Pacific"];

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub show_debug: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct Outcome {
    pub dry_run: bool,
    pub location_types_created: Vec<String>,
    pub custom_fields_created: Vec<String>,
    pub choices_created: usize,
    pub locations_created: Vec<String>,
    pub message: String,
}

pub async fn run(ctx: &JobContext, opts: &Options) -> Result<Outcome> {
    if opts.dry_run {
        tracing::info!("DRY RUN MODE - No changes will be made");
    }

    let mut outcome = Outcome { dry_run: opts.dry_run, ..Default::default() };
    if let Err(e) = ensure_all(ctx, opts, &mut outcome).await {
        tracing::error!("Failed to setup pre-flight data: {}", e);
        return Err(e);
    }

    outcome.message = if opts.dry_run {
        "Pre-flight data setup dry run completed - no changes made".to_string()
    } else {
        "Pre-flight data setup completed successfully".to_string()
    };
    success(&outcome.message);
    Ok(outcome)
}

async fn ensure_all(ctx: &JobContext, opts: &Options, outcome: &mut Outcome) -> Result<()> {
    tracing::info!("Ensuring location types (and allowed content types) exist...");
    ensure_location_types(ctx, opts, outcome).await?;

    tracing::info!("Ensuring custom fields exist...");
    ensure_custom_fields(ctx, opts, outcome).await?;

    tracing::info!("Ensuring locations exist...");
    ensure_locations(ctx, opts, outcome).await
}

/// `app_label.model` as a known content type, or `None` with a warning
async fn resolve_content_type(ctx: &JobContext, label: &str, show_debug: bool) -> Option<String> {
    let Some((app_label, model)) = label.split_once('.') else {
        tracing::warn!("Unknown content type '{}' - skipping", label);
        return None;
    };
    match ctx.nautobot.get_content_type(app_label, model).await {
        Ok(Some(ct)) => Some(format!("{}.{}", ct.app_label, ct.model)),
        Ok(None) => {
            tracing::warn!("Unknown content type '{}' - skipping", label);
            None
        }
        Err(e) => {
            if show_debug {
                tracing::debug!("Failed to resolve content type '{}': {}", label, e);
            }
            tracing::warn!("Unknown content type '{}' - skipping", label);
            None
        }
    }
}

async fn ensure_location_types(ctx: &JobContext, opts: &Options, outcome: &mut Outcome) -> Result<()> {
    for spec in LOCATION_TYPES {
        if opts.dry_run {
            tracing::info!("Would ensure LocationType '{}' exists", spec.name);
            if !spec.content_types.is_empty() {
                tracing::info!("  Would allow content types on '{}': {:?}", spec.name, spec.content_types);
            }
            continue;
        }

        let (mut lt, created) = ctx
            .nautobot
            .get_or_create_location_type(&LocationTypeCreate {
                name: spec.name.to_string(),
                description: spec.description.to_string(),
                nestable: spec.nestable,
                content_types: vec![],
            })
            .await?;
        if created {
            tracing::info!("Created LocationType: {}", spec.name);
            outcome.location_types_created.push(spec.name.to_string());
        } else if opts.show_debug {
            tracing::debug!("LocationType '{}' already exists", spec.name);
        }

        for label in spec.content_types {
            let Some(ct) = resolve_content_type(ctx, label, opts.show_debug).await else {
                continue;
            };
            if ctx.nautobot.add_location_type_content_type(&lt, &ct).await? {
                lt.content_types.push(ct);
                if opts.show_debug {
                    tracing::debug!("  Added allowed content type '{}' to LocationType '{}'", label, spec.name);
                }
            }
        }
    }
    Ok(())
}

async fn ensure_custom_fields(ctx: &JobContext, opts: &Options, outcome: &mut Outcome) -> Result<()> {
    for spec in CUSTOM_FIELDS {
        if opts.dry_run {
            tracing::info!("Would ensure custom field: {}", spec.key);
            for choice in spec.choices {
                tracing::info!("  Would ensure choice '{}' for field {}", choice, spec.key);
            }
            continue;
        }

        let (field, created) = ctx
            .nautobot
            .get_or_create_custom_field(&CustomFieldCreate {
                key: spec.key.to_string(),
                label: spec.label.to_string(),
                field_type: spec.field_type.to_string(),
                required: spec.required,
                description: spec.description.to_string(),
                weight: spec.weight,
                validation_regex: spec.validation_regex.to_string(),
                content_types: vec![LOCATION_CONTENT_TYPE.to_string()],
            })
            .await?;
        if created {
            tracing::info!("Created custom field: {}", spec.key);
            outcome.custom_fields_created.push(spec.key.to_string());
        } else if opts.show_debug {
            tracing::debug!("Custom field already exists: {}", spec.key);
        }

        if ctx.nautobot.add_custom_field_content_type(&field, LOCATION_CONTENT_TYPE).await? {
            tracing::info!("Associated custom field {} with Location model", spec.key);
        }

        for choice in spec.choices {
            let (_, created) = ctx
                .nautobot
                .get_or_create_custom_field_choice(&field.id, choice, CHOICE_WEIGHT)
                .await?;
            if created {
                tracing::info!("Created choice '{}' for field {}", choice, spec.key);
                outcome.choices_created += 1;
            } else if opts.show_debug {
                tracing::debug!("Choice '{}' already exists for field {}", choice, spec.key);
            }
        }
    }
    Ok(())
}

/// The named status, created if missing and allowed on locations
async fn status_for_locations(ctx: &JobContext, name: &str) -> Result<NbStatus> {
    let status = match ctx.nautobot.get_status_by_name(name).await? {
        Some(s) => s,
        None => {
            let color = match name.to_lowercase().as_str() {
                "planned" => "2196f3",
                "deprecated" => "9e9e9e",
                _ => "28a745",
            };
            ctx.nautobot
                .create_status(name, color, vec![LOCATION_CONTENT_TYPE.to_string()])
                .await?
        }
    };
    ctx.nautobot.add_status_content_type(&status, LOCATION_CONTENT_TYPE).await?;
    Ok(status)
}

async fn ensure_locations(ctx: &JobContext, opts: &Options, outcome: &mut Outcome) -> Result<()> {
    if opts.dry_run {
        for name in REGIONS {
            tracing::info!("Would ensure Location '{}' (Region) exists with status '{}'", name, status_name::ACTIVE);
        }
        return Ok(());
    }

    let status = status_for_locations(ctx, status_name::ACTIVE).await?;
    let region = ctx
        .nautobot
        .get_location_type_by_name("Region")
        .await?
        .ok_or_else(|| anyhow::anyhow!("LocationType Region not found"))?;

    for name in REGIONS {
        let (loc, created) = ctx
            .nautobot
            .get_or_create_location(&LocationCreate {
                name: name.to_string(),
                location_type: region.id.clone(),
                status: status.id.clone(),
                parent: None,
                description: format!("Region: {}", name),
            })
            .await?;

        if created {
            tracing::info!("Created Location '{}' (Region)", name);
            outcome.locations_created.push(name.to_string());
        } else if loc.status.is_none() {
            ctx.nautobot
                .update_location(&loc.id, &serde_json::json!({"status": status.id}))
                .await?;
            if opts.show_debug {
                tracing::debug!("Set missing status on Location '{}' -> {}", name, status.name);
            }
        } else if opts.show_debug {
            tracing::debug!("Location already exists: '{}' (Region)", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing;
    use httpmock::prelude::*;

    #[test]
    fn test_field_definitions() {
        let keys: Vec<&str> = CUSTOM_FIELDS.iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["site_slug", "site_code", "site_config_type", "site_environment"]);
        let select_choices: usize = CUSTOM_FIELDS.iter().map(|f| f.choices.len()).sum();
        assert_eq!(select_choices, 7);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_requests() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|_when, then| {
                then.status(500);
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let outcome = run(&ctx, &Options { dry_run: true, show_debug: true }).await.unwrap();
        assert!(outcome.dry_run);
        assert_eq!(outcome.message, "Pre-flight data setup dry run completed - no changes made");
        assert_eq!(any.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_existing_objects_are_left_alone() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/location-types/").query_param("name", "Region");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "lt-region", "name": "Region", "nestable": true, "content_types": []}
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/location-types/").query_param("name", "Site");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "lt-site", "name": "Site", "nestable": true, "content_types": [
                        "dcim.rack", "dcim.device", "dcim.powerpanel", "dcim.powerfeed", "ipam.prefix", "ipam.vlan"
                    ]}
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/content-types/");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": 1, "app_label": "dcim", "model": "rack"}
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/custom-fields/");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "cf1", "key": "any", "content_types": ["dcim.location"]}
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/custom-field-choices/");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "c1", "value": "v1"}])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "st1", "name": "Active", "content_types": ["dcim.location"]}
                ])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/locations/");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "loc1", "name": "US East", "status": {"id": "st1"}}
                ])));
            })
            .await;
        let writes = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500);
            })
            .await;
        let patches = server
            .mock_async(|when, then| {
                when.method(PATCH);
                then.status(500);
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let outcome = run(&ctx, &Options::default()).await.unwrap();

        assert!(outcome.location_types_created.is_empty());
        assert!(outcome.custom_fields_created.is_empty());
        assert_eq!(outcome.choices_created, 0);
        assert!(outcome.locations_created.is_empty());
        assert_eq!(writes.hits_async().await, 0);
        assert_eq!(patches.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_creates_missing_regions_with_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/extras/statuses/").query_param("name", "Active");
                then.status(200).json_body(testing::page(serde_json::json!([
                    {"id": "st1", "name": "Active", "content_types": []}
                ])));
            })
            .await;
        let associate = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/api/extras/statuses/st1/")
                    .json_body(serde_json::json!({"content_types": ["dcim.location"]}));
                then.status(200).json_body(serde_json::json!({"id": "st1"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/location-types/").query_param("name", "Region");
                then.status(200).json_body(testing::page(serde_json::json!([{"id": "lt-region", "name": "Region"}])));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/locations/");
                then.status(200).json_body(testing::page(serde_json::json!([])));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/dcim/locations/").body_includes("\"status\":\"st1\"");
                then.status(201).json_body(serde_json::json!({"id": "new", "name": "region"}));
            })
            .await;

        let ctx = testing::context(&server.base_url(), 1);
        let mut outcome = Outcome::default();
        ensure_locations(&ctx, &Options::default(), &mut outcome).await.unwrap();

        associate.assert_async().await;
        assert_eq!(create.hits_async().await, 5);
        assert_eq!(outcome.locations_created.len(), 5);
    }
}
