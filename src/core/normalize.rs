//! Stored media strings → `StoredRef`, and object-key derivation.
//!
//! 資料庫中的圖片欄位歷經多次搬遷，可能同時存在：
//! `/uploads/a.jpg`、`uploads\a.jpg`、`./public/uploads/a.jpg`、
//! 舊的 Cloudinary 網址，以及目前儲存空間的公開網址。

use crate::domain::model::StoredRef;
use crate::domain::ports::Storage;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub fn normalize_stored_path<S: Storage>(
    raw: &str,
    storage: &S,
    legacy_hosts: &[String],
) -> StoredRef {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return StoredRef::Empty;
    }
    if trimmed
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
    {
        return StoredRef::Inline;
    }

    let absolute = if trimmed.starts_with("//") {
        format!("https:{}", trimmed)
    } else {
        trimmed.to_string()
    };

    if let Some(key) = storage.key_for_url(&absolute) {
        return StoredRef::Bucket { key };
    }

    if is_http_url(&absolute) {
        let legacy = Url::parse(&absolute)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .map(|host| {
                legacy_hosts.iter().any(|h| {
                    let h = h.to_ascii_lowercase();
                    host == h || host.ends_with(&format!(".{}", h))
                })
            })
            .unwrap_or(false);
        return StoredRef::Remote {
            url: absolute,
            legacy,
        };
    }

    let rel_path = normalize_site_path(trimmed);
    if rel_path.is_empty() {
        return StoredRef::Empty;
    }
    StoredRef::Local { rel_path }
}

fn is_http_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `./public//uploads\a%20b.jpg?v=2` → `uploads/a b.jpg`
pub fn normalize_site_path(raw: &str) -> String {
    let mut path = raw.replace('\\', "/");
    if let Some(pos) = path.find(['?', '#']) {
        path.truncate(pos);
    }

    let decoded = urlencoding::decode(&path)
        .map(|d| d.into_owned())
        .unwrap_or(path);

    let segments: Vec<&str> = decoded
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let segments = match segments.first() {
        Some(first) if first.eq_ignore_ascii_case("public") => &segments[1..],
        _ => &segments[..],
    };

    segments.join("/")
}

/// 含 `..` 的路徑可能指到 public 目錄之外，一律不處理
pub fn escapes_root(rel_path: &str) -> bool {
    rel_path.split(['/', '\\']).any(|segment| segment == "..")
}

/// 本機路徑對應到儲存空間的 key：去掉開頭的 `uploads/`，逐段清理後加上前綴
/// （路徑本身已在前綴底下時不重複加）
pub fn object_key_for_local(rel_path: &str, key_prefix: &str) -> String {
    let mut segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > 1 && segments[0].eq_ignore_ascii_case("uploads") {
        segments.remove(0);
    }
    let cleaned: Vec<String> = segments
        .iter()
        .filter(|s| **s != "..")
        .map(|s| sanitize_segment(s))
        .collect();
    prefixed_key(key_prefix, &cleaned.join("/"))
}

fn prefixed_key(key_prefix: &str, rest: &str) -> String {
    let prefix = key_prefix.trim_matches('/');
    if !prefix.is_empty() && rest.starts_with(&format!("{}/", prefix)) {
        return rest.to_string();
    }
    join_key(prefix, rest)
}

/// 舊網址對應到 key：保留完整路徑（Cloudinary 網址取 `upload/` 之後的 public id），
/// 同名但不同資料夾的圖片才不會撞在一起
pub fn object_key_for_remote(url: &str, key_prefix: &str) -> String {
    let segments: Vec<String> = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .map(|segments| segments.filter(|s| !s.is_empty()).map(str::to_string).collect())
        })
        .unwrap_or_default();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    let public_path = match segments.iter().position(|s| *s == "upload") {
        Some(pos) if pos + 1 < segments.len() => strip_delivery_segments(&segments[pos + 1..]),
        _ => &segments[..],
    };

    let cleaned: Vec<String> = public_path
        .iter()
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .filter(|s| s != "..")
        .map(|s| sanitize_segment(&s))
        .collect();
    if cleaned.is_empty() {
        return join_key(key_prefix, "file");
    }
    prefixed_key(key_prefix, &cleaned.join("/"))
}

fn transformation_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let param = r"(?:a|ac|af|ar|b|bo|br|c|co|cs|d|dl|dn|dpr|du|e|eo|f|fl|fn|fps|g|h|if|ki|l|o|p|pg|q|r|so|sp|t|u|vc|vs|w|x|y|z|\$[a-z0-9]+)";
        Regex::new(&format!(r"^{param}_[^,/]+(?:,{param}_[^,/]+)*$")).expect("valid regex")
    })
}

fn version_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v\d+$").expect("valid regex"))
}

/// Cloudinary 傳送網址 `upload/` 之後的段落：去掉轉換參數與版本段，剩下 public id 路徑
pub fn strip_delivery_segments<'a, 'b>(segments: &'b [&'a str]) -> &'b [&'a str] {
    let mut rest = segments;
    while rest.len() > 1 && transformation_segment().is_match(rest[0]) {
        rest = &rest[1..];
    }
    if rest.len() > 1 && version_segment().is_match(rest[0]) {
        rest = &rest[1..];
    }
    rest
}

pub fn join_key(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", prefix, rest)
    }
}

pub fn sanitize_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 取得 key 或路徑最後一段的檔名
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
