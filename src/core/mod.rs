pub mod json;
pub mod parts;
pub mod path;
pub mod urls;

pub use parts::{
    collect_group_controls, detach_sub_controls, flatten_controls, flatten_nested, flatten_parts,
};
pub use path::{get_at_path, set_at_path, Accessor, EditMode, JsonPath, PathSegment};
pub use urls::{
    fix_json_urls, import_url, normalize_reference, resolve_back_matter_href, resolve_relative,
};
