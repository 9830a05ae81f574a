//! KFX symbol vocabulary and symbol table management.
//!
//! KFX payloads reference the `YJ_symbols` shared table (version 10). The
//! table's symbol text is only known by convention, so every shared SID `n`
//! is written as the placeholder `$n`; the names below are used for lookups
//! from CSS mapping code and for human-readable dumps.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::kfx::ion::{IonValue, StructBuilder};

/// Number of Ion 1.0 system symbols preceding any import.
pub const ION_SYSTEM_SYMBOL_COUNT: u32 = 9;
/// `max_id` declared for the `YJ_symbols` import.
pub const SHARED_MAX_ID: u32 = 851;
pub const FIRST_SHARED_SID: u32 = ION_SYSTEM_SYMBOL_COUNT + 1;
pub const LAST_SHARED_SID: u32 = ION_SYSTEM_SYMBOL_COUNT + SHARED_MAX_ID;
/// First SID handed out to document-local symbols.
pub const LOCAL_MIN_ID: u32 = LAST_SHARED_SID + 1;

pub const SHARED_TABLE_NAME: &str = "YJ_symbols";
pub const SHARED_TABLE_VERSION: i64 = 10;

/// Names of the `YJ_symbols` shared table, indexed by `sid - FIRST_SHARED_SID`.
///
/// SIDs past the end of this list (up to [`LAST_SHARED_SID`]) are imported
/// but unnamed; they render as `$<sid>`.
#[rustfmt::skip]
pub static YJ_SYMBOL_NAMES: [&str; 842] = [
    // $10
    "language", "font_family", "font_style", "font_weight", "font_variant", "font_stretch",
    "font_size", "font_scale", "ot_features", "text_color",
    // $20
    "text_opacity", "text_background_color", "text_background_opacity", "underline",
    "underline_color", "underline_opacity", "underline_weight", "strikethrough",
    "strikethrough_color", "strikethrough_opacity",
    // $30
    "strikethrough_weight", "baseline_shift", "letterspacing", "wordspacing", "text_alignment",
    "text_alignment_last", "text_indent", "left_indent", "right_indent", "space_before",
    // $40
    "space_after", "text_transform", "line_height", "line_height_fit", "baseline_style",
    "nobreak", "margin", "margin_top", "margin_left", "margin_bottom",
    // $50
    "margin_right", "padding", "padding_top", "padding_left", "padding_bottom", "padding_right",
    "width", "height", "top", "left",
    // $60
    "bottom", "right", "min_height", "min_width", "max_height", "max_width", "fixed_width",
    "fixed_height", "visibility", "ignore",
    // $70
    "fill_color", "fill_gradient", "fill_opacity", "fill_bounds", "fill_rule", "stroke_color",
    "stroke_width", "stroke_linecap", "border_opacity", "border_opacity_top",
    // $80
    "border_opacity_left", "border_opacity_bottom", "border_opacity_right", "border_color",
    "border_color_top", "border_color_left", "border_color_bottom", "border_color_right",
    "border_style", "border_style_top",
    // $90
    "border_style_left", "border_style_bottom", "border_style_right", "border_weight",
    "border_weight_top", "border_weight_left", "border_weight_bottom", "border_weight_right",
    "transform", "draw_spanning_borders",
    // $100
    "list_style", "list_indent_style", "list_indent", "list_replacer", "list_start_offset",
    "outline_color", "outline_offset", "outline_style", "outline_weight", "gradient_type",
    // $110
    "gradient_stops", "gradient_stop", "column_count", "column_gap", "column_min_width",
    "column_rule_style", "column_rule_color", "column_rule_weight", "column_span",
    "column_balance",
    // $120
    "footnote_line_style", "footnote_line_color", "footnote_line_weight",
    "footnote_line_length", "footnote_spacing", "dropcap_lines", "dropcap_chars", "hyphens",
    "min_hyphen_word_length", "min_chars_per_line",
    // $130
    "keep_together", "first", "last", "break_after", "break_before", "break_inside",
    "max_auto_grow", "min_auto_shrink", "scale_with_image", "wrap_rule",
    // $140
    "float", "page_templates", "style_events", "offset", "length", "content", "content_list",
    "knockout_region", "table_column_span", "table_row_span",
    // $150
    "table_border_collapse", "header", "column_format", "title", "description", "id", "layout",
    "style", "parent_style", "type",
    // $160
    "embed", "format", "mime", "target", "external_resource", "location", "search_path",
    "referred_resources", "manifest", "reading_orders",
    // $170
    "sections", "condition", "conditional_styling", "style_name", "section_name",
    "resource_name", "story_name", "gradient_name", "reading_order_name", "link_to",
    // $180
    "anchor_name", "contains", "locations", "position", "pid", "eid", "uri", "link_confirm",
    "link_use_external_app", "up_image",
    // $190
    "down_image", "paragraph_mark", "direction", "PRIVATE_parent_image_scale",
    "PRIVATE_view_width", "PRIVATE_view_height", "PRIVATE_is_storyline_content",
    "PRIVATE_paper_color", "PRIVATE_ink_color", "section_title",
    // $200
    "section_kicker", "section_description", "section_author", "section_tags",
    "section_date_created", "is_advertisement", "smooth_scrolling", "hide_from_toc",
    "section_layout", "has_audio",
    // $210
    "has_video", "has_slideshow", "toc", "scrubbers", "thumbnails", "orientation",
    "binding_direction", "support_portrait", "support_landscape", "issue_date",
    // $220
    "binding_direction_left", "binding_direction_right", "author", "ISBN", "ASIN",
    "is_TTS_enabled", "date_created", "ISBN-10", "ISBN-13", "MHID",
    // $230
    "target_WideDimension", "target_NarrowDimension", "publisher", "cover_page", "illustrator",
    "nav_type", "landmarks", "page_list", "landmark_type", "nav_container_name",
    // $240
    "nav_unit_name", "representation", "designation", "enumeration", "label", "icon",
    "target_position", "entries", "entry_set", "path",
    // $250
    "shape_list", "cde_content_type", "container_list", "entity_dependencies",
    "mandatory_dependencies", "optional_dependencies", "AmazonDigitalBook", "inherit",
    "metadata", "storyline",
    // $260
    "section", "style_group", "font", "gradient", "position_map", "position_id_map", "anchor",
    "section_metadata", "hyphen_dictionary", "text",
    // $270
    "container", "image", "kvg", "shape", "plugin", "knockout", "list", "listitem", "table",
    "table_row",
    // $280
    "sidebar", "footnote", "figure", "inline", "png", "jpg", "gif", "pobject", "localPage",
    "hasContent",
    // $290
    "paragraphMark", "or", "and", "not", "==", "!=", ">", ">=", "<", "<=",
    // $300
    "hasColor", "hasVideo", "screenPixelWidth", "screenPixelHeight", "screenActualWidth",
    "screenActualHeight", "unit", "value", "em", "ex",
    // $310
    "lh", "vw", "vh", "vmin", "percent", "cm", "mm", "in", "pt", "px",
    // $320
    "center", "justify", "horizontal", "vertical", "fixed", "overflow", "scale_fit", "radial",
    "solid", "double",
    // $330
    "dashed", "dotted", "thick_thin", "thin_thick", "groove", "ridge", "inset", "outset",
    "non_zero", "even_odd",
    // $340
    "disc", "square", "circle", "numeric", "roman_lower", "roman_upper", "alpha_lower",
    "alpha_upper", "null", "none",
    // $350
    "normal", "default", "always", "avoid", "column", "thin", "ultra_light", "light", "book",
    "medium",
    // $360
    "semi_bold", "bold", "ultra_bold", "heavy", "ultra_heavy", "condensed", "semi_condensed",
    "semi_expanded", "expanded", "small_caps",
    // $370
    "superscript", "subscript", "uppercase", "lowercase", "titlecase", "rtl", "ltr",
    "content_bounds", "border_bounds", "padding_bounds",
    // $380
    "margin_bounds", "oblique", "italic", "auto", "manual", "portrait", "landscape",
    "preview_images", "overlay_resource", "book_navigation",
    // $390
    "section_navigation", "nav_container", "nav_containers", "nav_unit",
    "conditional_nav_group_unit", "resource_path", "srl", "titlepage", "acknowledgements",
    "preface",
    // $400
    "loi", "lot", "bibliography", "index", "glossary", "frontmatter", "bodymatter",
    "backmatter", "erl", "bcContId",
    // $410
    "bcComprType", "bcDRMScheme", "bcChunkSize", "bcIndexTabOffset", "bcIndexTabLength",
    "bcDocSymbolOffset", "bcDocSymbolLength", "bcRawMedia", "bcRawFont", "container_entity_map",
    // $420
    "pbm", "both", "resource_width", "resource_height", "cover_image",
    "page_progression_direction", "activate", "ordinal", "action", "backdrop_style",
    // $430
    "hide", "show", "blank", "orientation_lock", "virtual_panel", "auto_crop", "selection",
    "page_spread", "facing_page", "zoom_target",
    // $440
    "popup", "enabled", "disabled", "zoom_panel", "popup_text", "text_vert_anchor",
    "text_hori_anchor", "text_top", "text_baseline", "text_bottom",
    // $450
    "text_start", "text_middle", "text_end", "caption", "body", "footer",
    "border_spacing_vertical", "border_spacing_horizontal", "hide_empty_cells",
    "border_radius_top_left",
    // $460
    "border_radius_top_right", "border_radius_bottom_left", "border_radius_bottom_right",
    "PRIVATE_doc_fonts", "volume_label", "parent_asin", "asset_id", "revision_id", "zoom_in",
    "zoom_out",
    // $470
    "btt", "ttb", "force", "scale", "source", "fit_text", "clip", "spacing_percent_base",
    "fit_width", "background_image",
    // $480
    "background_positionx", "background_positiony", "background_sizex", "background_sizey",
    "background_repeat", "repeat_x", "repeat_y", "no_repeat", "relative", "viewport",
    // $490
    "book_metadata", "categorised_metadata", "key", "priority", "refines", "category",
    "shadows", "text_shadows", "color", "horizontal_offset",
    // $500
    "vertical_offset", "blur", "spread", "list_style_image", "custom_viewer", "rem", "ch",
    "vmax", "gridlines", "parameter_list",
    // $510
    "set_parameters", "hang_punctuation", "layouts", "layout_name", "grid_system",
    "component_layout", "+", "-", "*", "/",
    // $520
    "asSymbol", "asString", "asNumber", "asList", "asStructure", "isLandscape", "isPortrait",
    "isFirstPage", "text_background_image", "stroke_linejoin",
    // $530
    "stroke_miterlimit", "stroke_dasharray", "stroke_dashoffset", "round", "butt", "miter",
    "bevel", "component", "document_data", "component_name",
    // $540
    "salience", "border_radius", "clip_path_list", "clip_path", "clip_rule", "clip_path_index",
    "sizing_bounds", "background_origin", "jxr", "transform_origin",
    // $550
    "location_map", "list_style_position", "inside", "outside", "overline", "overline_color",
    "overline_weight", "horizontal_tb", "vertical_lr", "vertical_rl",
    // $560
    "writing_mode", "all_small_caps", "ligatures", "kerning", "page_index", "pdf",
    "text_overflow", "ellipsis", "text_clip", "word_break",
    // $570
    "break_all", "kicker", "article_id", "all", "browse", "nav_visibility",
    "link_visited_style", "link_unvisited_style", "nbsp_mode", "space",
    // $580
    "box_align", "pan_zoom", "letterspacing_left", "glyph_transform", "alt_text",
    "content_features", "namespace", "major_version", "minor_version", "version_info",
    // $590
    "features", "exclude", "include", "format_capabilities", "bcFCapabilitiesOffset",
    "bcFCapabilitiesLength", "horizontal_rule", "auxiliary_data", "kfx_id", "bmp",
    // $600
    "tiff", "render", "block", "layout_type", "model", "word_iteration_type", "word", "icu",
    "structure", "section_position_id_map",
    // $610
    "yj.eidhash_eid_section_map", "yj.section_pid_count_map", "yj.bpg", "yj.authoring",
    "yj.conversion", "yj.classification", "yj.display", "yj.note", "yj.chapternote",
    "yj.endnote",
    // $620
    "yj.sidenote", "yj.location_pid_map", "yj.first_line_style", "yj.number_of_lines",
    "yj.percentage", "yj.first_line_style_type", "yj.kfxid_eid_map",
    "yj.interactive_element_list", "yj.float_clear", "yj.table_features",
    // $630
    "yj.table_selection_mode", "yj.rowwise", "yj.regional", "yj.vertical_align", "yj.sorting",
    "yj.variants", "yj.tiles", "yj.tile_width", "yj.tile_height",
    "yj.user_margin_top_percentage",
    // $640
    "yj.user_margin_bottom_percentage", "yj.user_margin_left_percentage",
    "yj.user_margin_right_percentage", "yj.header_overlay", "yj.footer_overlay", "yj.max_crop",
    "yj.collision", "yj.min_aspect_ratio", "yj.max_aspect_ratio", "yj.viewer",
    // $650
    "yj.border_path", "yj.majority", "yj.queue", "yj.connected_page_spread",
    "yj.connected_panels", "yj.connected_pagination", "yj.enable_connected_dps",
    "yj.disable_stacking", "yj.float_align", "yj.supports",
    // $660
    "yj.illustrated_layout", "yj.disable_adaptive_layout", "yj.disable_repeated_headers",
    "yj.conditional_properties", "yj.sdl_version", "yj.comic_panel_view_mode", "yj.guided_view",
    "yj.content_defined", "yj.auto_contrast", "yj.before",
    // $670
    "yj.after", "yj.at", "yj.float_bias", "yj.float_to_block", "bidi_unicode", "bidi_embed",
    "isolate", "override", "isolate_override", "plaintext",
    // $680
    "start", "end", "bidi_direction", "annotations", "pan_zoom_viewer", "select_as_group",
    "kvg_content_type", "annotation_type", "math", "mathsegment",
    // $690
    "mathml", "nontext", "path_bundle", "path_list", "arabic_indic", "persian",
    "word_boundary_list", "yj.dictionary", "is_empty", "fallback_width",
    // $700
    "important_cells", "default_fixed_reading_order", "reading_order_switch_map", "switch_map",
    "target_reading_order", "source_position", "text_orientation", "text_combine",
    "character_width", "fullwidth",
    // $710
    "halfwidth", "quarterwidth", "thirdwidth", "proportional", "yj", "nowrap", "white_space",
    "text_emphasis_style", "text_emphasis_color", "text_emphasis_position_horizontal",
    // $720
    "text_emphasis_position_vertical", "text_emphasis_spacing", "text_emphasis_size",
    "text_emphasis_align", "filled", "open", "filled_dot", "open_dot", "filled_circle",
    "open_circle",
    // $730
    "filled_double_circle", "open_double_circle", "filled_triangle", "open_triangle",
    "filled_sesame", "open_sesame", "cjk_ideographic", "cjk_earthly_branch",
    "cjk_heavenly_stem", "hiragana",
    // $740
    "hiragana_iroha", "katakana", "katakana_iroha", "japanese_formal", "japanese_informal",
    "simp_chinese_informal", "simp_chinese_formal", "trad_chinese_informal",
    "trad_chinese_formal", "alt_content",
    // $750
    "yj.layout_type", "yj.large_tables", "yj.in_page", "yj.table_viewer", "main_content_id",
    "truncated_bounds", "ruby_content", "ruby_name", "ruby_id", "ruby_id_list",
    // $760
    "treat_as_title", "layout_hints", "ruby_position_horizontal", "ruby_position_vertical",
    "ruby_merge", "ruby_text_align", "ruby_base_align", "ruby_overhang_chars",
    "ruby_overhang_amount", "ruby_text_gap",
    // $770
    "ruby_base_edge_align", "separate", "collapse", "space_around", "space_between", "any",
    "JLREQ", "JIS_X_4051", "sideways", "upright",
    // $780
    "line_break", "loose", "strict", "anywhere", "fit_tight", "keep_lines_together",
    "snap_block", "recaps_reading_order", "yj_break_after", "yj_break_before",
    // $790
    "yj.semantics.heading_level", "lower_greek", "upper_greek", "lower_armenian",
    "upper_armenian", "georgian", "decimal_leading_zero", "yj.tile_padding", "headings", "h1",
    // $800
    "h2", "h3", "h4", "h5", "h6", "gradient_angle", "gradient_direction", "to_right", "to_left",
    "to_top",
    // $810
    "to_bottom", "to_top_right", "to_top_left", "to_bottom_right", "to_bottom_left", "deg",
    "grad", "rad", "turn", "conic",
    // $820
    "linear", "table_metadata", "table_row_count", "table_column_count", "table_cell_count",
    "table_character_count", "audio", "video", "rendition_flow", "continue_rendition_flow",
    // $830
    "scrollable", "paginated", "standalone_entities", "document_regions",
    "yj.user_margin_bounds", "ellipse", "rectangle", "line", "polygon", "polyline",
    // $840
    "shape_dimensions", "x", "y", "cx", "cy", "radius_x", "radius_y", "start_x", "start_y",
    "end_x",
    // $850
    "end_y", "vertex_list",
];

/// Symbol IDs from the YJ_symbols shared table used by the generator.
#[allow(dead_code)]
pub mod sym {
    // Ion system symbols
    pub const ION_SYMBOL_TABLE: u32 = 3;
    pub const NAME: u32 = 4;
    pub const VERSION: u32 = 5;
    pub const IMPORTS: u32 = 6;
    pub const SYMBOLS: u32 = 7;
    pub const MAX_ID: u32 = 8;

    // ==========================================================================
    // STYLE PROPERTIES
    // ==========================================================================
    pub const LANGUAGE: u32 = 10;
    pub const FONT_FAMILY: u32 = 11;
    pub const FONT_STYLE: u32 = 12;
    pub const FONT_WEIGHT: u32 = 13;
    pub const FONT_STRETCH: u32 = 15;
    pub const FONT_SIZE: u32 = 16;
    pub const TEXT_COLOR: u32 = 19;
    pub const TEXT_BACKGROUND_COLOR: u32 = 21;
    pub const UNDERLINE: u32 = 23;
    pub const STRIKETHROUGH: u32 = 27;
    pub const BASELINE_SHIFT: u32 = 31;
    pub const LETTERSPACING: u32 = 32;
    pub const WORDSPACING: u32 = 33;
    pub const TEXT_ALIGNMENT: u32 = 34;
    pub const TEXT_INDENT: u32 = 36;
    pub const TEXT_TRANSFORM: u32 = 41;
    pub const LINE_HEIGHT: u32 = 42;
    pub const BASELINE_STYLE: u32 = 44;
    pub const NOBREAK: u32 = 45;
    pub const MARGIN_TOP: u32 = 47;
    pub const MARGIN_LEFT: u32 = 48;
    pub const MARGIN_BOTTOM: u32 = 49;
    pub const MARGIN_RIGHT: u32 = 50;
    pub const PADDING_TOP: u32 = 52;
    pub const PADDING_LEFT: u32 = 53;
    pub const PADDING_BOTTOM: u32 = 54;
    pub const PADDING_RIGHT: u32 = 55;
    pub const WIDTH: u32 = 56;
    pub const HEIGHT: u32 = 57;
    pub const MIN_HEIGHT: u32 = 62;
    pub const MIN_WIDTH: u32 = 63;
    pub const MAX_HEIGHT: u32 = 64;
    pub const MAX_WIDTH: u32 = 65;
    pub const FIXED_WIDTH: u32 = 66;
    pub const FIXED_HEIGHT: u32 = 67;
    pub const VISIBILITY: u32 = 68;
    pub const FILL_COLOR: u32 = 70;
    pub const FILL_OPACITY: u32 = 72;
    pub const BORDER_COLOR: u32 = 83;
    pub const BORDER_COLOR_TOP: u32 = 84;
    pub const BORDER_COLOR_LEFT: u32 = 85;
    pub const BORDER_COLOR_BOTTOM: u32 = 86;
    pub const BORDER_COLOR_RIGHT: u32 = 87;
    pub const BORDER_STYLE: u32 = 88;
    pub const BORDER_STYLE_TOP: u32 = 89;
    pub const BORDER_STYLE_LEFT: u32 = 90;
    pub const BORDER_STYLE_BOTTOM: u32 = 91;
    pub const BORDER_STYLE_RIGHT: u32 = 92;
    pub const BORDER_WEIGHT: u32 = 93;
    pub const BORDER_WEIGHT_TOP: u32 = 94;
    pub const BORDER_WEIGHT_LEFT: u32 = 95;
    pub const BORDER_WEIGHT_BOTTOM: u32 = 96;
    pub const BORDER_WEIGHT_RIGHT: u32 = 97;
    pub const LIST_STYLE: u32 = 100;
    pub const HYPHENS: u32 = 127;
    pub const BREAK_AFTER: u32 = 133;
    pub const BREAK_BEFORE: u32 = 134;
    pub const BREAK_INSIDE: u32 = 135;
    pub const FLOAT: u32 = 140;
    pub const TABLE_COLUMN_SPAN: u32 = 148;
    pub const TABLE_ROW_SPAN: u32 = 149;
    pub const TABLE_BORDER_COLLAPSE: u32 = 150;
    pub const BOX_ALIGN: u32 = 580;
    pub const SIZING_BOUNDS: u32 = 546;
    pub const GLYPH_TRANSFORM: u32 = 583;
    pub const YJ_FLOAT_CLEAR: u32 = 628;
    pub const YJ_BREAK_AFTER: u32 = 788;
    pub const YJ_BREAK_BEFORE: u32 = 789;
    pub const LAYOUT_HINTS: u32 = 761;
    pub const TREAT_AS_TITLE: u32 = 760;

    // ==========================================================================
    // CONTENT STRUCTURE
    // ==========================================================================
    pub const PAGE_TEMPLATES: u32 = 141;
    pub const STYLE_EVENTS: u32 = 142;
    pub const OFFSET: u32 = 143;
    pub const LENGTH: u32 = 144;
    pub const CONTENT: u32 = 145;
    pub const CONTENT_LIST: u32 = 146;
    pub const TITLE: u32 = 153;
    pub const DESCRIPTION: u32 = 154;
    pub const ID: u32 = 155;
    pub const LAYOUT: u32 = 156;
    pub const STYLE: u32 = 157;
    pub const PARENT_STYLE: u32 = 158;
    pub const TYPE: u32 = 159;
    pub const FORMAT: u32 = 161;
    pub const MIME: u32 = 162;
    pub const EXTERNAL_RESOURCE: u32 = 164;
    pub const LOCATION: u32 = 165;
    pub const READING_ORDERS: u32 = 169;
    pub const SECTIONS: u32 = 170;
    pub const STYLE_NAME: u32 = 173;
    pub const SECTION_NAME: u32 = 174;
    pub const RESOURCE_NAME: u32 = 175;
    pub const STORY_NAME: u32 = 176;
    pub const READING_ORDER_NAME: u32 = 178;
    pub const LINK_TO: u32 = 179;
    pub const ANCHOR_NAME: u32 = 180;
    pub const CONTAINS: u32 = 181;
    pub const LOCATIONS: u32 = 182;
    pub const POSITION: u32 = 183;
    pub const PID: u32 = 184;
    pub const EID: u32 = 185;
    pub const URI: u32 = 186;
    pub const DIRECTION: u32 = 192;
    pub const ALT_TEXT: u32 = 584;
    pub const RENDER: u32 = 601;
    pub const YJ_CLASSIFICATION: u32 = 615;
    pub const YJ_DISPLAY: u32 = 616;
    pub const YJ_NOTE: u32 = 617;
    pub const YJ_HEADING_LEVEL: u32 = 790;
    pub const INDEX: u32 = 403;
    pub const CAPTION: u32 = 453;

    // ==========================================================================
    // NAVIGATION
    // ==========================================================================
    pub const TOC: u32 = 212;
    pub const NAV_TYPE: u32 = 235;
    pub const NAV_CONTAINER_NAME: u32 = 239;
    pub const REPRESENTATION: u32 = 241;
    pub const LABEL: u32 = 244;
    pub const TARGET_POSITION: u32 = 246;
    pub const ENTRIES: u32 = 247;
    pub const BOOK_NAVIGATION: u32 = 389;
    pub const NAV_CONTAINER: u32 = 391;
    pub const NAV_CONTAINERS: u32 = 392;
    pub const NAV_UNIT: u32 = 393;
    pub const NAV_UNIT_NAME: u32 = 240;
    pub const LANDMARKS: u32 = 236;
    pub const COVER_PAGE: u32 = 233;
    pub const SRL: u32 = 396;
    pub const LANDMARK_TYPE: u32 = 238;
    pub const HEADINGS: u32 = 798;

    // ==========================================================================
    // FRAGMENT TYPES
    // ==========================================================================
    pub const CONTAINER_LIST: u32 = 252;
    pub const ENTITY_DEPENDENCIES: u32 = 253;
    pub const MANDATORY_DEPENDENCIES: u32 = 254;
    pub const OPTIONAL_DEPENDENCIES: u32 = 255;
    pub const METADATA: u32 = 258;
    pub const STORYLINE: u32 = 259;
    pub const SECTION: u32 = 260;
    pub const FONT: u32 = 262;
    pub const POSITION_MAP: u32 = 264;
    pub const POSITION_ID_MAP: u32 = 265;
    pub const ANCHOR: u32 = 266;
    pub const SECTION_METADATA: u32 = 267;
    pub const CONTAINER_INFO: u32 = 270;
    pub const RESOURCE_PATH: u32 = 395;
    pub const RAW_MEDIA: u32 = 417;
    pub const RAW_FONT: u32 = 418;
    pub const CONTAINER_ENTITY_MAP: u32 = 419;
    pub const BOOK_METADATA: u32 = 490;
    pub const DOCUMENT_DATA: u32 = 538;
    pub const LOCATION_MAP: u32 = 550;
    pub const CONTENT_FEATURES: u32 = 585;
    pub const FORMAT_CAPABILITIES: u32 = 593;
    pub const AUXILIARY_DATA: u32 = 597;
    pub const SECTION_POSITION_ID_MAP: u32 = 609;

    // ==========================================================================
    // CONTENT TYPES
    // ==========================================================================
    pub const TEXT: u32 = 269;
    pub const CONTAINER: u32 = 270;
    pub const IMAGE: u32 = 271;
    pub const LIST: u32 = 276;
    pub const LISTITEM: u32 = 277;
    pub const TABLE: u32 = 278;
    pub const TABLE_ROW: u32 = 279;
    pub const FOOTNOTE: u32 = 281;
    pub const INLINE: u32 = 283;
    pub const BODY: u32 = 454;
    pub const FOOTER: u32 = 455;

    // ==========================================================================
    // VALUES
    // ==========================================================================
    pub const TOP: u32 = 58;
    pub const LEFT: u32 = 59;
    pub const BOTTOM: u32 = 60;
    pub const RIGHT: u32 = 61;
    pub const PNG: u32 = 284;
    pub const JPG: u32 = 285;
    pub const GIF: u32 = 286;
    pub const UNIT: u32 = 306;
    pub const VALUE: u32 = 307;
    pub const UNIT_EM: u32 = 308;
    pub const UNIT_EX: u32 = 309;
    pub const UNIT_LH: u32 = 310;
    pub const UNIT_PERCENT: u32 = 314;
    pub const UNIT_PT: u32 = 318;
    pub const UNIT_PX: u32 = 319;
    pub const UNIT_REM: u32 = 505;
    pub const CENTER: u32 = 320;
    pub const JUSTIFY: u32 = 321;
    pub const VERTICAL: u32 = 323;
    pub const SCALE_FIT: u32 = 326;
    pub const SOLID: u32 = 328;
    pub const DOUBLE: u32 = 329;
    pub const DASHED: u32 = 330;
    pub const DOTTED: u32 = 331;
    pub const GROOVE: u32 = 334;
    pub const RIDGE: u32 = 335;
    pub const INSET: u32 = 336;
    pub const OUTSET: u32 = 337;
    pub const DISC: u32 = 340;
    pub const SQUARE: u32 = 341;
    pub const CIRCLE: u32 = 342;
    pub const NUMERIC: u32 = 343;
    pub const NULL: u32 = 348;
    pub const NONE: u32 = 349;
    pub const NORMAL: u32 = 350;
    pub const DEFAULT: u32 = 351;
    pub const ALWAYS: u32 = 352;
    pub const AVOID: u32 = 353;
    pub const LIGHT: u32 = 357;
    pub const MEDIUM: u32 = 359;
    pub const SEMI_BOLD: u32 = 360;
    pub const BOLD: u32 = 361;
    pub const SMALL_CAPS: u32 = 369;
    pub const SUPERSCRIPT: u32 = 370;
    pub const SUBSCRIPT: u32 = 371;
    pub const UPPERCASE: u32 = 372;
    pub const LOWERCASE: u32 = 373;
    pub const TITLECASE: u32 = 374;
    pub const LTR: u32 = 376;
    pub const CONTENT_BOUNDS: u32 = 377;
    pub const OBLIQUE: u32 = 381;
    pub const ITALIC: u32 = 382;
    pub const AUTO: u32 = 383;
    pub const SELECTION: u32 = 436;
    pub const ENABLED: u32 = 441;
    pub const BOTH: u32 = 421;
    pub const SPACING_PERCENT_BASE: u32 = 477;
    pub const HORIZONTAL_TB: u32 = 557;
    pub const WRITING_MODE: u32 = 560;
    pub const START: u32 = 680;
    pub const END: u32 = 681;
    pub const FIRST: u32 = 131;
    pub const LAST: u32 = 132;
    pub const THIN: u32 = 355;
    pub const ULTRA_LIGHT: u32 = 356;
    pub const ULTRA_BOLD: u32 = 362;
    pub const HEAVY: u32 = 363;
    pub const RTL: u32 = 375;
    pub const MANUAL: u32 = 384;
    pub const FONT_VARIANT: u32 = 14;
    pub const OVERLINE: u32 = 554;
    pub const WHITE_SPACE: u32 = 716;
    pub const BORDER_SPACING_VERTICAL: u32 = 456;
    pub const BORDER_SPACING_HORIZONTAL: u32 = 457;

    // ==========================================================================
    // CONTAINER / METADATA
    // ==========================================================================
    pub const CONTAINER_ID: u32 = 409;
    pub const COMPRESSION_TYPE: u32 = 410;
    pub const DRM_SCHEME: u32 = 411;
    pub const CHUNK_SIZE: u32 = 412;
    pub const INDEX_TABLE_OFFSET: u32 = 413;
    pub const INDEX_TABLE_LENGTH: u32 = 414;
    pub const SYMBOL_TABLE_OFFSET: u32 = 415;
    pub const SYMBOL_TABLE_LENGTH: u32 = 416;
    pub const RESOURCE_WIDTH: u32 = 422;
    pub const RESOURCE_HEIGHT: u32 = 423;
    pub const COVER_IMAGE: u32 = 424;
    pub const CATEGORISED_METADATA: u32 = 491;
    pub const KEY: u32 = 492;
    pub const CATEGORY: u32 = 495;
    pub const NAMESPACE: u32 = 586;
    pub const MAJOR_VERSION: u32 = 587;
    pub const MINOR_VERSION: u32 = 588;
    pub const VERSION_INFO: u32 = 589;
    pub const FEATURES: u32 = 590;
    pub const FORMAT_CAPABILITIES_OFFSET: u32 = 594;
    pub const FORMAT_CAPABILITIES_LENGTH: u32 = 595;
    pub const KFX_ID: u32 = 598;

    /// Entity id written in the entity table for singleton fragments.
    pub const SINGLETON_ID: u32 = 348;
}

// =============================================================================
// Classification tables
// =============================================================================

const RAW_TYPES: &[u32] = &[sym::RAW_MEDIA, sym::RAW_FONT];

const ROOT_TYPES: &[u32] = &[
    sym::METADATA,
    sym::POSITION_MAP,
    sym::POSITION_ID_MAP,
    sym::CONTAINER_INFO,
    sym::BOOK_NAVIGATION,
    sym::RESOURCE_PATH,
    sym::CONTAINER_ENTITY_MAP,
    sym::BOOK_METADATA,
    sym::DOCUMENT_DATA,
    sym::LOCATION_MAP,
    sym::CONTENT_FEATURES,
    sym::FORMAT_CAPABILITIES,
];

const CONTAINER_FRAGMENT_TYPES: &[u32] = &[sym::CONTAINER_INFO, sym::FORMAT_CAPABILITIES];

const REQUIRED_BOOK_TYPES: &[u32] = &[
    sym::METADATA,
    sym::STORYLINE,
    sym::SECTION,
    sym::POSITION_MAP,
    sym::POSITION_ID_MAP,
    sym::CONTAINER_ENTITY_MAP,
    sym::DOCUMENT_DATA,
    sym::LOCATION_MAP,
];

const ALLOWED_BOOK_TYPES: &[u32] = &[
    sym::CONTENT,
    sym::STYLE,
    sym::EXTERNAL_RESOURCE,
    sym::FONT,
    263, // gradient
    sym::ANCHOR,
    sym::SECTION_METADATA,
    sym::TEXT,
    sym::BOOK_NAVIGATION,
    390, // section_navigation
    sym::NAV_CONTAINER,
    sym::NAV_UNIT,
    sym::RESOURCE_PATH,
    sym::RAW_MEDIA,
    sym::RAW_FONT,
    sym::BOOK_METADATA,
    sym::CONTENT_FEATURES,
    sym::FORMAT_CAPABILITIES,
    sym::AUXILIARY_DATA,
    sym::SECTION_POSITION_ID_MAP,
];

/// Fragment types identified by their type alone (fid == `$type`).
pub fn is_root(ftype: u32) -> bool {
    ROOT_TYPES.contains(&ftype)
}

/// Root types that occur at most once per container.
pub fn is_singleton(ftype: u32) -> bool {
    ftype != sym::RESOURCE_PATH && is_root(ftype)
}

/// Payload is stored as raw bytes rather than Ion.
pub fn is_raw(ftype: u32) -> bool {
    RAW_TYPES.contains(&ftype)
}

/// Stored in the container header instead of an entity.
pub fn is_container_fragment(ftype: u32) -> bool {
    CONTAINER_FRAGMENT_TYPES.contains(&ftype)
}

pub fn is_required_for_book(ftype: u32) -> bool {
    REQUIRED_BOOK_TYPES.contains(&ftype)
}

pub fn is_allowed_for_book(ftype: u32) -> bool {
    is_required_for_book(ftype) || ALLOWED_BOOK_TYPES.contains(&ftype)
}

// =============================================================================
// Shared symbol lookups
// =============================================================================

/// Name ↔ id lookup over the shared table.
///
/// Built once and shared read-only between conversions.
#[derive(Debug, Clone)]
pub struct SymbolCatalog {
    by_name: HashMap<&'static str, u32>,
}

impl Default for SymbolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolCatalog {
    pub fn new() -> Self {
        let by_name = YJ_SYMBOL_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| (*name, FIRST_SHARED_SID + i as u32))
            .collect();
        Self { by_name }
    }

    /// Canonical name for a symbol id, or the `$<id>` placeholder.
    pub fn name_of(&self, id: u32) -> Cow<'static, str> {
        name_of(id)
    }

    /// Resolve `$<n>` placeholders or canonical names. `None` for unknown names.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        if let Some(id) = parse_placeholder(name) {
            return Some(id);
        }
        self.by_name.get(name).copied()
    }
}

/// Canonical name for a shared symbol id, or the `$<id>` placeholder.
pub fn name_of(id: u32) -> Cow<'static, str> {
    if id >= FIRST_SHARED_SID {
        if let Some(name) = YJ_SYMBOL_NAMES.get((id - FIRST_SHARED_SID) as usize) {
            return Cow::Borrowed(*name);
        }
    }
    Cow::Owned(format!("${id}"))
}

fn parse_placeholder(name: &str) -> Option<u32> {
    name.strip_prefix('$')?.parse().ok()
}

// =============================================================================
// Local symbol table
// =============================================================================

/// Document-local symbols (fragment ids, style names, story names).
#[derive(Debug, Default, Clone)]
pub struct LocalSymbols {
    /// Local symbol text in SID order
    symbols: Vec<String>,
    ids: HashMap<String, u32>,
}

impl LocalSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a symbol ID for a name.
    ///
    /// `$<n>` placeholders resolve to the shared SID without interning.
    pub fn get_or_intern(&mut self, name: &str) -> u32 {
        if let Some(id) = parse_placeholder(name) {
            return id;
        }
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = LOCAL_MIN_ID + self.symbols.len() as u32;
        self.symbols.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Get symbol ID without interning.
    pub fn get(&self, name: &str) -> Option<u32> {
        if let Some(id) = parse_placeholder(name) {
            return Some(id);
        }
        self.ids.get(name).copied()
    }

    /// Text of a SID: local text, shared name or placeholder.
    pub fn text_of(&self, id: u32) -> Cow<'_, str> {
        if id >= LOCAL_MIN_ID {
            if let Some(text) = self.symbols.get((id - LOCAL_MIN_ID) as usize) {
                return Cow::Borrowed(text);
            }
        }
        name_of(id)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// `$ion_symbol_table::{imports: [YJ_symbols], symbols: [...]}`
    pub fn symbol_table_value(&self) -> IonValue {
        let import = StructBuilder::new()
            .string(sym::NAME, SHARED_TABLE_NAME)
            .int(sym::VERSION, SHARED_TABLE_VERSION)
            .int(sym::MAX_ID, i64::from(SHARED_MAX_ID))
            .build();

        let mut table = StructBuilder::new().list(sym::IMPORTS, vec![import]);
        if !self.symbols.is_empty() {
            let symbols = self
                .symbols
                .iter()
                .map(|s| IonValue::String(s.clone()))
                .collect();
            table = table.list(sym::SYMBOLS, symbols);
        }

        IonValue::Annotated(vec![sym::ION_SYMBOL_TABLE], Box::new(table.build()))
    }
}
