/// Canonical form of an asset path, used as the lookup key everywhere.
///
/// Backslashes become `/`, leading `./` and `/` are stripped and repeated
/// separators collapse.
pub fn asset_key(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_key() {
        assert_eq!(asset_key("ui/icons/a.png"), "ui/icons/a.png");
        assert_eq!(asset_key("./ui//icons\\a.png"), "ui/icons/a.png");
        assert_eq!(asset_key("/ui/a.png"), "ui/a.png");
        assert_eq!(asset_key(""), "");
    }
}
