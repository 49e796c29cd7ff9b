/// Join a route fragment onto its parent path.
///
/// Under the root parent a leading `/` on the fragment is dropped so the two
/// never produce `//`. A trailing `/` is trimmed, a relative result is made
/// absolute and an empty result becomes the root.
pub fn normalize(prefix: &str, parent: &str) -> String {
    let prefix = if parent == "/" {
        prefix.strip_prefix('/').unwrap_or(prefix)
    } else {
        prefix
    };

    let mut path = String::with_capacity(parent.len() + prefix.len() + 1);
    if !parent.starts_with('/') && !prefix.starts_with('/') {
        path.push('/');
    }
    path.push_str(parent);
    path.push_str(prefix);

    if path.ends_with('/') {
        path.pop();
    }

    if path.is_empty() {
        path.push('/');
    }

    path
}
