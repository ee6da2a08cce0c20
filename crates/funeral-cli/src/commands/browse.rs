//! Repository browsing commands.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::NaiveDateTime;
use clap::Args;
use funeral_registry::{Descriptor, ManifestInfo, RepositoryInfo};
use funeral_session::HOME_PATH;

use super::{explain, print_json, Context, OutputFormat};

/// Arguments for the tags command.
#[derive(Args, Debug)]
pub struct TagsArgs {
    /// Repository name (e.g., "library/nginx")
    pub repository: String,
}

/// Arguments for the manifest command.
#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Repository name
    pub repository: String,

    /// Tag or digest
    #[arg(default_value = "latest")]
    pub reference: String,

    /// Print the manifest exactly as served
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for the blob command.
#[derive(Args, Debug)]
pub struct BlobArgs {
    /// Repository name
    pub repository: String,

    /// Blob digest (e.g., "sha256:...")
    pub digest: String,

    /// Output file
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Arguments for the delete command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Repository name
    pub repository: String,

    /// Delete only this tag or digest instead of the whole repository
    #[arg(long)]
    pub reference: Option<String>,
}

/// Console page of a repository.
fn repository_page(repository: &str) -> String {
    format!("/repository/{repository}")
}

/// Lists repositories.
pub async fn repos(ctx: &Context) -> Result<()> {
    ctx.enter(HOME_PATH).await?;
    let repositories = ctx.registry.repositories().await.map_err(explain)?;

    if ctx.format == OutputFormat::Json {
        return print_json(&repositories);
    }

    if repositories.is_empty() {
        println!("No repositories");
        return Ok(());
    }

    println!("{:<40} {:>6}  UPDATED", "REPOSITORY", "TAGS");
    for repository in &repositories {
        println!("{}", repository_row(repository));
    }
    Ok(())
}

/// Lists the tags of a repository.
pub async fn tags(ctx: &Context, args: &TagsArgs) -> Result<()> {
    ctx.enter(&repository_page(&args.repository)).await?;
    let tags = ctx
        .registry
        .list_tags(&args.repository)
        .await
        .map_err(explain)?;

    if ctx.format == OutputFormat::Json {
        return print_json(&tags);
    }

    if tags.is_empty() {
        println!("{} has no tags", args.repository);
    }
    for tag in &tags {
        println!("{tag}");
    }
    Ok(())
}

/// Shows a manifest.
pub async fn manifest(ctx: &Context, args: &ManifestArgs) -> Result<()> {
    ctx.enter(&repository_page(&args.repository)).await?;
    let info = ctx
        .registry
        .manifest(&args.repository, &args.reference)
        .await
        .map_err(explain)?;

    if args.raw {
        println!("{}", String::from_utf8_lossy(&info.raw));
        return Ok(());
    }
    if ctx.format == OutputFormat::Json {
        return print_json(&info.manifest);
    }

    for line in manifest_summary(&info) {
        println!("{line}");
    }
    Ok(())
}

/// Downloads a blob to a file.
pub async fn blob(ctx: &Context, args: &BlobArgs) -> Result<()> {
    ctx.enter(&repository_page(&args.repository)).await?;
    println!("Fetching {}@{}...", args.repository, args.digest);

    let data = ctx
        .registry
        .blob(&args.repository, &args.digest)
        .await
        .map_err(explain)?;

    std::fs::write(&args.output, &data)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("  Digest verified");
    println!("  Wrote {} bytes to {}", data.len(), args.output.display());
    Ok(())
}

/// Deletes a tag or a whole repository.
pub async fn delete(ctx: &Context, args: &DeleteArgs) -> Result<()> {
    ctx.enter(&repository_page(&args.repository)).await?;

    match args.reference {
        Some(ref reference) => {
            ctx.registry
                .delete_manifest(&args.repository, reference)
                .await
                .map_err(explain)?;
            println!("Deleted {}:{reference}", args.repository);
        }
        None => {
            ctx.registry
                .delete_repository(&args.repository)
                .await
                .map_err(explain)?;
            println!("Deleted repository {}", args.repository);
        }
    }
    Ok(())
}

fn repository_row(repository: &RepositoryInfo) -> String {
    format!(
        "{:<40} {:>6}  {}",
        repository.name,
        repository.tag_count,
        format_time(repository.updated_at.or(repository.created_at))
    )
}

pub(crate) fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

fn manifest_summary(info: &ManifestInfo) -> Vec<String> {
    let manifest = &info.manifest;
    let media_type = info
        .media_type
        .as_ref()
        .or(manifest.media_type.as_ref())
        .map_or("unknown", |m| m.as_str());

    let mut lines = vec![
        format!("Digest:     {}", info.digest),
        format!("Media type: {media_type}"),
    ];

    if manifest.is_index() {
        lines.push(format!("Platforms:  {}", manifest.manifests.len()));
        for descriptor in &manifest.manifests {
            let platform = descriptor
                .platform
                .as_ref()
                .map_or_else(|| "unknown".to_string(), ToString::to_string);
            lines.push(format!("  {platform:<20} {}", descriptor.digest));
        }
    } else {
        if let Some(ref config) = manifest.config {
            lines.push(format!("Config:     {}", config.digest));
        }
        lines.push(format!(
            "Layers:     {} ({} bytes total)",
            manifest.layers.len(),
            manifest.image_size()
        ));
        lines.extend(manifest.layers.iter().map(layer_line));
    }
    lines
}

fn layer_line(layer: &Descriptor) -> String {
    format!("  {} {:>12}  {}", layer.digest, layer.size, layer.media_type)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Commands};

    fn manifest_info(json: &str) -> ManifestInfo {
        ManifestInfo {
            manifest: serde_json::from_str(json).unwrap(),
            digest: "sha256:abc".to_string(),
            media_type: None,
            raw: json.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_manifest_args_default_reference() {
        let cli = Cli::try_parse_from(["funeral", "manifest", "library/nginx"]).unwrap();
        match cli.command {
            Commands::Manifest(args) => {
                assert_eq!(args.reference, "latest");
                assert!(!args.raw);
            }
            _ => panic!("expected manifest"),
        }
    }

    #[test]
    fn test_blob_args_require_output() {
        assert!(Cli::try_parse_from(["funeral", "blob", "busybox", "sha256:abc"]).is_err());
        let cli =
            Cli::try_parse_from(["funeral", "blob", "busybox", "sha256:abc", "-o", "layer.tar"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Blob(ref a) if a.output == PathBuf::from("layer.tar")));
    }

    #[test]
    fn test_repository_page() {
        assert_eq!(repository_page("library/nginx"), "/repository/library/nginx");
    }

    #[test]
    fn test_repository_row() {
        let info = RepositoryInfo {
            name: "busybox".to_string(),
            created_at: None,
            updated_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                .and_then(|d| d.and_hms_opt(12, 30, 0)),
            tag_count: 3,
        };
        let row = repository_row(&info);
        assert!(row.starts_with("busybox"));
        assert!(row.contains(" 3 "));
        assert!(row.ends_with("2024-03-01 12:30"));
        assert_eq!(format_time(None), "-");
    }

    #[test]
    fn test_manifest_summary_image() {
        let info = manifest_info(
            r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:cfg", "size": 10},
                "layers": [
                    {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:l1", "size": 100},
                    {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:l2", "size": 50}
                ]
            }"#,
        );
        let lines = manifest_summary(&info);
        assert!(lines.contains(&"Media type: application/vnd.oci.image.manifest.v1+json".to_string()));
        assert!(lines.contains(&"Config:     sha256:cfg".to_string()));
        assert!(lines.iter().any(|l| l.contains("2 (160 bytes total)")));
    }

    #[test]
    fn test_manifest_summary_index() {
        let info = manifest_info(
            r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.index.v1+json",
                "manifests": [
                    {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:amd", "size": 1,
                     "platform": {"architecture": "amd64", "os": "linux"}},
                    {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:arm", "size": 1,
                     "platform": {"architecture": "arm64", "os": "linux", "variant": "v8"}}
                ]
            }"#,
        );
        let lines = manifest_summary(&info);
        assert!(lines.contains(&"Platforms:  2".to_string()));
        assert!(lines.iter().any(|l| l.contains("linux/arm64/v8") && l.contains("sha256:arm")));
    }
}
