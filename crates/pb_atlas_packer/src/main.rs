use pb_core::{HitBoxAlgorithm, Texture};
use pb_render::{AtlasConfig, HeadlessContext, TextureAtlas};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

const METADATA_VERSION: &str = "0.2";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
struct PackerConfig {
    atlas: AtlasConfig,
    hit_box: HitBoxAlgorithm,
}

#[derive(Debug, Serialize, Deserialize)]
struct AtlasMetadata {
    version: String,
    atlas_id: String,
    texture: AtlasTexture,
    sprites: Vec<AtlasSprite>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AtlasTexture {
    path: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct AtlasSprite {
    name: String,
    source_path: String,
    source_hash: String,
    rect_px: AtlasRectPx,
    uv: AtlasUvRect,
    /// Centre-relative, y-up, counter-clockwise.
    hit_box: Vec<[f32; 2]>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AtlasRectPx {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct AtlasUvRect {
    u0: f32,
    v0: f32,
    u1: f32,
    v1: f32,
}

struct PackedAtlas {
    atlas: TextureAtlas<HeadlessContext>,
    sources: Vec<(PathBuf, Arc<Texture>)>,
}

fn usage() -> String {
    "Usage: cargo run -p pb_atlas_packer -- <input_dir> <atlas_png_output> <atlas_json_output> [config_json]\nExample: cargo run -p pb_atlas_packer -- assets/sprites assets/generated/sprites.png assets/generated/sprites.json packer.json".to_string()
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 || args.len() > 5 {
        return Err(usage());
    }

    let input_dir = PathBuf::from(&args[1]);
    let atlas_png_output = PathBuf::from(&args[2]);
    let atlas_json_output = PathBuf::from(&args[3]);
    let config = match args.get(4) {
        Some(path) => load_packer_config(Path::new(path))?,
        None => PackerConfig::default(),
    };

    let input_files = collect_png_inputs(&input_dir)?;
    let packed = pack_textures(&input_files, &config)?;

    let atlas_id = atlas_json_output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("atlas")
        .to_string();
    let metadata = build_metadata(&packed, &atlas_id, &atlas_png_output)?;

    for output in [&atlas_png_output, &atlas_json_output] {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create output dir '{}': {e}", parent.display()))?;
        }
    }

    let png_tmp = temporary_output_path(&atlas_png_output);
    packed
        .atlas
        .save(&png_tmp)
        .map_err(|e| format!("Failed to write '{}': {e}", png_tmp.display()))?;

    let json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| format!("Failed to serialize atlas metadata: {e}"))?;
    let json_tmp = temporary_output_path(&atlas_json_output);
    fs::write(&json_tmp, json).map_err(|e| format!("Failed to write '{}': {e}", json_tmp.display()))?;

    promote_outputs_transactional(&[(&png_tmp, &atlas_png_output), (&json_tmp, &atlas_json_output)])?;

    log::info!(
        "Packed {} sprites into {}x{} ({:.1}% used) -> {} and {}",
        metadata.sprites.len(),
        metadata.texture.width,
        metadata.texture.height,
        packed.atlas.occupancy() * 100.0,
        atlas_png_output.display(),
        atlas_json_output.display()
    );
    Ok(())
}

fn load_packer_config(path: &Path) -> Result<PackerConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read packer config '{}': {e}", path.display()))?;
    let config: PackerConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse packer config '{}': {e}", path.display()))?;
    config
        .atlas
        .validate()
        .map_err(|e| format!("Packer config '{}': {e}", path.display()))?;
    Ok(config)
}

fn collect_png_inputs(input_dir: &Path) -> Result<Vec<PathBuf>, String> {
    let mut input_files: Vec<PathBuf> = fs::read_dir(input_dir)
        .map_err(|e| format!("Failed to read input dir '{}': {e}", input_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("png"))
        .collect();
    input_files.sort();

    if input_files.is_empty() {
        return Err(format!(
            "No .png files found in input directory '{}'",
            input_dir.display()
        ));
    }
    Ok(input_files)
}

/// Loads every input with the configured hit-box algorithm and adds it to a
/// fresh atlas. Files that fail to decode are skipped; running out of atlas
/// space is fatal.
fn pack_textures(input_files: &[PathBuf], config: &PackerConfig) -> Result<PackedAtlas, String> {
    let context = Rc::new(HeadlessContext::new());
    let mut atlas = TextureAtlas::new(context, config.atlas).map_err(|e| format!("Invalid atlas config: {e}"))?;
    let mut sources = Vec::with_capacity(input_files.len());

    for source_path in input_files {
        let texture = match Texture::from_file(source_path, config.hit_box) {
            Ok(texture) => Arc::new(texture),
            Err(err) => {
                log::warn!("Skipping '{}': {err}", source_path.display());
                continue;
            }
        };
        atlas
            .add(&texture)
            .map_err(|e| format!("Failed to pack '{}': {e}", source_path.display()))?;
        log::debug!(
            "packed {} ({}x{}, {} hit box points)",
            source_path.display(),
            texture.width(),
            texture.height(),
            texture.hit_box().len()
        );
        sources.push((source_path.clone(), texture));
    }

    if sources.is_empty() {
        return Err("None of the input images could be loaded".to_string());
    }
    Ok(PackedAtlas { atlas, sources })
}

/// Region lookups happen after packing so every rect reflects the final
/// atlas size, even if it grew partway through.
fn build_metadata(packed: &PackedAtlas, atlas_id: &str, atlas_png_output: &Path) -> Result<AtlasMetadata, String> {
    let (width, height) = packed.atlas.size();
    let mut sprites = Vec::with_capacity(packed.sources.len());
    for (source_path, texture) in &packed.sources {
        let region = packed
            .atlas
            .region(texture.cache_key())
            .ok_or_else(|| format!("'{}' is missing from the packed atlas", source_path.display()))?;
        let name = source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sprite")
            .to_string();
        sprites.push(AtlasSprite {
            name,
            source_path: normalize_path_for_json(source_path),
            source_hash: texture.content_hash(),
            rect_px: AtlasRectPx {
                x: region.x,
                y: region.y,
                w: region.width,
                h: region.height,
            },
            uv: AtlasUvRect {
                u0: region.coords.u0,
                v0: region.coords.v0,
                u1: region.coords.u1(),
                v1: region.coords.v1(),
            },
            hit_box: texture.hit_box().iter().map(|p| p.to_array()).collect(),
        });
    }

    Ok(AtlasMetadata {
        version: METADATA_VERSION.to_string(),
        atlas_id: atlas_id.to_string(),
        texture: AtlasTexture {
            path: normalize_path_for_json(atlas_png_output),
            width,
            height,
        },
        sprites,
    })
}

fn normalize_path_for_json(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn temporary_output_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    path.with_file_name(format!("{file_name}.tmp"))
}

fn promote_temporary_file(temp_path: &Path, final_path: &Path) -> Result<(), String> {
    if final_path.exists() {
        fs::remove_file(final_path)
            .map_err(|e| format!("Failed to replace existing output '{}': {e}", final_path.display()))?;
    }
    fs::rename(temp_path, final_path).map_err(|e| {
        format!(
            "Failed to move temporary output '{}' -> '{}': {e}",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// Either every output is replaced or the previous ones are restored.
fn promote_outputs_transactional(pairs: &[(&Path, &Path)]) -> Result<(), String> {
    let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (_, final_path) in pairs {
        if !final_path.exists() {
            continue;
        }
        let backup_path = final_path.with_extension("bak.tmp");
        if let Err(e) = fs::rename(final_path, &backup_path) {
            restore_backups(&backups);
            return Err(format!(
                "Failed to stage backup '{}' -> '{}': {e}",
                final_path.display(),
                backup_path.display()
            ));
        }
        backups.push((final_path.to_path_buf(), backup_path));
    }

    for (index, (temp_path, final_path)) in pairs.iter().enumerate() {
        if let Err(err) = promote_temporary_file(temp_path, final_path) {
            for (_, promoted) in pairs[..index].iter().rev() {
                let _ = fs::remove_file(promoted);
            }
            restore_backups(&backups);
            return Err(err);
        }
    }

    for (_, backup_path) in backups {
        let _ = fs::remove_file(backup_path);
    }
    Ok(())
}

fn restore_backups(backups: &[(PathBuf, PathBuf)]) {
    for (final_path, backup_path) in backups {
        if !final_path.exists() {
            let _ = fs::rename(backup_path, final_path);
        }
    }
}
