//! Map files.
//!
//! A map document supplies the grid geometry, the static ground of
//! every 8x8 cell and an ordered list of entity placements. Entities
//! are constructed in file order, which is what makes initial Z
//! assignment deterministic. Any malformed record fails the whole
//! load; there is no partial recovery mid-load.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use crate::entities::{
    block::Block, door::Door, separator::Separator, CrystalBlockOrientation, DynamicTile,
    EntityAddError, EntityKind, EntityRegistry, EntitySpec, EntityType, Stream,
};
use crate::geom::Rectangle;
use crate::ground::{Ground, MapGeometry};
use crate::movement::Direction4;
use crate::resources::{Tileset, TilesetStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownAttribute,
    MissingAttribute,
    InvalidValue,
    UnknownEntityType,
    UnknownGround,
    UnknownPattern,
    UnknownTileset,
    DuplicateEntityName,
    LayerOutOfRange,
    EntityRejected,
}

#[derive(Debug, Clone)]
pub struct MapLoadError {
    pub code: MapErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for MapLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                location.line,
                location.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for MapLoadError {}

struct MapParser<'a> {
    file_path: &'a Path,
    tilesets: &'a TilesetStore,
}

impl<'a> MapParser<'a> {
    fn error(&self, code: MapErrorCode, message: impl Into<String>) -> MapLoadError {
        MapLoadError {
            code,
            message: message.into(),
            file_path: self.file_path.to_path_buf(),
            location: None,
        }
    }

    fn error_at(
        &self,
        code: MapErrorCode,
        message: impl Into<String>,
        document: &Document<'_>,
        node: &Node<'_, '_>,
    ) -> MapLoadError {
        let position = document.text_pos_at(node.range().start);
        MapLoadError {
            code,
            message: message.into(),
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: position.row as usize,
                column: position.col as usize,
            }),
        }
    }
}

/// Loads a map file into a fresh registry.
pub fn load_map_file(
    path: &Path,
    tilesets: &TilesetStore,
) -> Result<EntityRegistry, MapLoadError> {
    let raw = fs::read_to_string(path).map_err(|error| MapLoadError {
        code: MapErrorCode::ReadFile,
        message: format!("failed to read map file: {error}"),
        file_path: path.to_path_buf(),
        location: None,
    })?;
    load_map_str(&raw, path, tilesets)
}

pub fn load_map_str(
    xml: &str,
    path_for_errors: &Path,
    tilesets: &TilesetStore,
) -> Result<EntityRegistry, MapLoadError> {
    let parser = MapParser {
        file_path: path_for_errors,
        tilesets,
    };
    let document = Document::parse(xml).map_err(|error| MapLoadError {
        code: MapErrorCode::XmlMalformed,
        message: error.to_string(),
        file_path: path_for_errors.to_path_buf(),
        location: None,
    })?;
    let root = document.root_element();
    if root.tag_name().name() != "map" {
        return Err(parser.error_at(
            MapErrorCode::InvalidRoot,
            format!("expected root element <map>, found <{}>", root.tag_name().name()),
            &document,
            &root,
        ));
    }

    let geometry = parse_geometry(&parser, &document, &root)?;
    let tileset_id = require_attr(&parser, &document, &root, "tileset")?;
    let tileset = tilesets.get(tileset_id).map_err(|error| {
        parser.error_at(MapErrorCode::UnknownTileset, error.to_string(), &document, &root)
    })?;

    let mut registry = EntityRegistry::new(geometry);

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "grounds" => parse_grounds(&parser, &document, &child, geometry, &tileset, &mut registry)?,
            "entities" => parse_entities(&parser, &document, &child, &mut registry)?,
            other => {
                return Err(parser.error_at(
                    MapErrorCode::UnknownElement,
                    format!("unexpected element <{other}> in <map>"),
                    &document,
                    &child,
                ))
            }
        }
    }

    info!(
        width = geometry.width,
        height = geometry.height,
        layers = geometry.max_layer - geometry.min_layer + 1,
        entities = registry.entity_count(),
        "map loaded"
    );
    Ok(registry)
}

fn parse_geometry(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    root: &Node<'_, '_>,
) -> Result<MapGeometry, MapLoadError> {
    let width = parse_i32_attr(parser, document, root, "width")?;
    let height = parse_i32_attr(parser, document, root, "height")?;
    let min_layer = parse_i32_attr(parser, document, root, "min_layer")?;
    let max_layer = parse_i32_attr(parser, document, root, "max_layer")?;
    if width <= 0 || height <= 0 || width % 8 != 0 || height % 8 != 0 {
        return Err(parser.error_at(
            MapErrorCode::InvalidValue,
            format!("map size {width}x{height} must be positive multiples of 8"),
            document,
            root,
        ));
    }
    if min_layer > max_layer {
        return Err(parser.error_at(
            MapErrorCode::InvalidValue,
            format!("min_layer {min_layer} exceeds max_layer {max_layer}"),
            document,
            root,
        ));
    }
    Ok(MapGeometry {
        width,
        height,
        min_layer,
        max_layer,
    })
}

fn parse_grounds(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    grounds: &Node<'_, '_>,
    geometry: MapGeometry,
    tileset: &Tileset,
    registry: &mut EntityRegistry,
) -> Result<(), MapLoadError> {
    let layer = parse_i32_attr(parser, document, grounds, "layer")?;
    if !geometry.is_valid_layer(layer) {
        return Err(parser.error_at(
            MapErrorCode::LayerOutOfRange,
            format!(
                "grounds layer {layer} is outside [{}, {}]",
                geometry.min_layer, geometry.max_layer
            ),
            document,
            grounds,
        ));
    }
    for rect in grounds.children().filter(Node::is_element) {
        if rect.tag_name().name() != "rect" {
            return Err(parser.error_at(
                MapErrorCode::UnknownElement,
                format!("unexpected element <{}> in <grounds>", rect.tag_name().name()),
                document,
                &rect,
            ));
        }
        let x8 = parse_i32_attr(parser, document, &rect, "x8")?;
        let y8 = parse_i32_attr(parser, document, &rect, "y8")?;
        let width8 = parse_i32_attr(parser, document, &rect, "width8")?;
        let height8 = parse_i32_attr(parser, document, &rect, "height8")?;
        if x8 < 0
            || y8 < 0
            || width8 <= 0
            || height8 <= 0
            || x8 + width8 > geometry.width8()
            || y8 + height8 > geometry.height8()
        {
            return Err(parser.error_at(
                MapErrorCode::InvalidValue,
                format!("ground rect ({x8},{y8}) {width8}x{height8} leaves the grid"),
                document,
                &rect,
            ));
        }
        let ground = match (rect.attribute("ground"), rect.attribute("pattern")) {
            (Some(name), None) => Ground::from_name(name).ok_or_else(|| {
                parser.error_at(
                    MapErrorCode::UnknownGround,
                    format!("unknown ground '{name}'"),
                    document,
                    &rect,
                )
            })?,
            (None, Some(pattern)) => {
                let pattern_id: u32 = pattern.parse().map_err(|_| {
                    parser.error_at(
                        MapErrorCode::InvalidValue,
                        format!("pattern id '{pattern}' is not an unsigned integer"),
                        document,
                        &rect,
                    )
                })?;
                tileset.pattern_ground(pattern_id).ok_or_else(|| {
                    parser.error_at(
                        MapErrorCode::UnknownPattern,
                        format!(
                            "tileset '{}' has no pattern {pattern_id}",
                            tileset.id()
                        ),
                        document,
                        &rect,
                    )
                })?
            }
            _ => {
                return Err(parser.error_at(
                    MapErrorCode::MissingAttribute,
                    "ground rect needs exactly one of 'ground' or 'pattern'",
                    document,
                    &rect,
                ))
            }
        };
        for y in y8..y8 + height8 {
            for x in x8..x8 + width8 {
                registry.set_ground_cell(layer, x, y, ground);
            }
        }
    }
    Ok(())
}

const COMMON_ENTITY_ATTRS: &[&str] = &["type", "name", "layer", "x", "y", "width", "height"];

fn allowed_attrs(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Door => &["open", "savegame_variable"],
        EntityType::Block => &["pushable", "max_moves"],
        EntityType::DynamicTile => &["ground", "enabled"],
        EntityType::CrystalBlock => &["orientation"],
        EntityType::Stream => &["direction"],
        _ => &[],
    }
}

fn parse_entities(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    entities: &Node<'_, '_>,
    registry: &mut EntityRegistry,
) -> Result<(), MapLoadError> {
    for node in entities.children().filter(Node::is_element) {
        if node.tag_name().name() != "entity" {
            return Err(parser.error_at(
                MapErrorCode::UnknownElement,
                format!(
                    "unexpected element <{}> in <entities>",
                    node.tag_name().name()
                ),
                document,
                &node,
            ));
        }
        let type_name = require_attr(parser, document, &node, "type")?;
        let entity_type = EntityType::from_name(type_name).ok_or_else(|| {
            parser.error_at(
                MapErrorCode::UnknownEntityType,
                format!("unknown entity type '{type_name}'"),
                document,
                &node,
            )
        })?;

        for attribute in node.attributes() {
            let name = attribute.name();
            if !COMMON_ENTITY_ATTRS.contains(&name) && !allowed_attrs(entity_type).contains(&name) {
                return Err(parser.error_at(
                    MapErrorCode::UnknownAttribute,
                    format!("attribute '{name}' is not valid for entity type '{type_name}'"),
                    document,
                    &node,
                ));
            }
        }

        let name = node.attribute("name").map(str::to_string);
        if let Some(name) = &name {
            if registry.find_entity(name).is_some() {
                return Err(parser.error_at(
                    MapErrorCode::DuplicateEntityName,
                    format!("duplicate entity name '{name}'"),
                    document,
                    &node,
                ));
            }
        }
        let layer = parse_i32_attr(parser, document, &node, "layer")?;
        let x = parse_i32_attr(parser, document, &node, "x")?;
        let y = parse_i32_attr(parser, document, &node, "y")?;
        let width = optional_i32_attr(parser, document, &node, "width")?.unwrap_or(16);
        let height = optional_i32_attr(parser, document, &node, "height")?.unwrap_or(16);
        if width <= 0 || height <= 0 {
            return Err(parser.error_at(
                MapErrorCode::InvalidValue,
                format!("entity size {width}x{height} must be positive"),
                document,
                &node,
            ));
        }

        let kind = parse_kind(parser, document, &node, entity_type)?;
        let mut spec = EntitySpec::new(entity_type, layer, Rectangle::new(x, y, width, height))
            .with_kind(kind);
        spec.name = name;
        registry.add_entity(spec).map_err(|error| {
            let code = match error {
                EntityAddError::InvalidLayer { .. } => MapErrorCode::LayerOutOfRange,
                _ => MapErrorCode::EntityRejected,
            };
            parser.error_at(code, error.to_string(), document, &node)
        })?;
    }
    Ok(())
}

fn parse_kind(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    node: &Node<'_, '_>,
    entity_type: EntityType,
) -> Result<EntityKind, MapLoadError> {
    Ok(match entity_type {
        EntityType::Door => {
            let open = optional_bool_attr(parser, document, node, "open")?.unwrap_or(false);
            let savegame_variable = node.attribute("savegame_variable").map(str::to_string);
            EntityKind::Door(Door::new(open, savegame_variable))
        }
        EntityType::Block => {
            let pushable = optional_bool_attr(parser, document, node, "pushable")?.unwrap_or(true);
            let max_moves = optional_i32_attr(parser, document, node, "max_moves")?
                .map(|moves| {
                    if moves < 0 {
                        Err(parser.error_at(
                            MapErrorCode::InvalidValue,
                            format!("max_moves {moves} must not be negative"),
                            document,
                            node,
                        ))
                    } else {
                        Ok(moves as u32)
                    }
                })
                .transpose()?;
            EntityKind::Block(Block::new(pushable, max_moves))
        }
        EntityType::DynamicTile => {
            let ground_name = require_attr(parser, document, node, "ground")?;
            let ground = Ground::from_name(ground_name).ok_or_else(|| {
                parser.error_at(
                    MapErrorCode::UnknownGround,
                    format!("unknown ground '{ground_name}'"),
                    document,
                    node,
                )
            })?;
            let enabled = optional_bool_attr(parser, document, node, "enabled")?.unwrap_or(true);
            EntityKind::DynamicTile(DynamicTile { ground, enabled })
        }
        EntityType::CrystalBlock => {
            let orientation = match require_attr(parser, document, node, "orientation")? {
                "orange" => CrystalBlockOrientation::Orange,
                "blue" => CrystalBlockOrientation::Blue,
                other => {
                    return Err(parser.error_at(
                        MapErrorCode::InvalidValue,
                        format!("unknown crystal block orientation '{other}'"),
                        document,
                        node,
                    ))
                }
            };
            EntityKind::CrystalBlock(orientation)
        }
        EntityType::Stream => {
            let direction_name = require_attr(parser, document, node, "direction")?;
            let direction = Direction4::from_name(direction_name).ok_or_else(|| {
                parser.error_at(
                    MapErrorCode::InvalidValue,
                    format!("unknown direction '{direction_name}'"),
                    document,
                    node,
                )
            })?;
            EntityKind::Stream(Stream { direction })
        }
        EntityType::Separator => EntityKind::Separator(Separator),
        _ => EntityKind::Plain,
    })
}

fn require_attr<'n>(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    node: &Node<'n, 'n>,
    name: &str,
) -> Result<&'n str, MapLoadError> {
    node.attribute(name).ok_or_else(|| {
        parser.error_at(
            MapErrorCode::MissingAttribute,
            format!(
                "<{}> is missing the '{name}' attribute",
                node.tag_name().name()
            ),
            document,
            node,
        )
    })
}

fn parse_i32_attr(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    node: &Node<'_, '_>,
    name: &str,
) -> Result<i32, MapLoadError> {
    let raw = require_attr(parser, document, node, name)?;
    raw.parse().map_err(|_| {
        parser.error_at(
            MapErrorCode::InvalidValue,
            format!("attribute '{name}' value '{raw}' is not an integer"),
            document,
            node,
        )
    })
}

fn optional_i32_attr(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    node: &Node<'_, '_>,
    name: &str,
) -> Result<Option<i32>, MapLoadError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            parser.error_at(
                MapErrorCode::InvalidValue,
                format!("attribute '{name}' value '{raw}' is not an integer"),
                document,
                node,
            )
        }),
    }
}

fn optional_bool_attr(
    parser: &MapParser<'_>,
    document: &Document<'_>,
    node: &Node<'_, '_>,
    name: &str,
) -> Result<Option<bool>, MapLoadError> {
    match node.attribute(name) {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(parser.error_at(
            MapErrorCode::InvalidValue,
            format!("attribute '{name}' value '{other}' is not 'true' or 'false'"),
            document,
            node,
        )),
    }
}
