//! URL naming for model routes.

use super::ModelInfo;

/// How a model's base path is derived.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RouteNaming {
    /// `{prefix}{namespace}/{plural}`. Unique across namespaces.
    #[default]
    NamespacedPlural,
    /// Deprecated. `{prefix}{name}`: two models with the same name in
    /// different namespaces collide. Logs a warning when routes are derived.
    FlatName,
}

/// Splits `input` into words and joins them lowercased with `-`.
///
/// Word boundaries are non-alphanumeric characters, lower-to-upper case
/// changes, the end of an acronym (`XMLHttp` → `xml-http`) and letter/digit
/// changes (`v2Api` → `v-2-api`).
pub fn kebab_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_numeric() != c.is_numeric())
                || (prev.is_uppercase() && c.is_uppercase() && next.is_some_and(char::is_lowercase));
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words.join("-")
}

/// Forces a leading and a trailing `/`. An empty prefix becomes `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{trimmed}/")
    }
}

/// Base path of a model's routes under `prefix`.
pub fn base_path(prefix: &str, model: &ModelInfo, naming: RouteNaming) -> String {
    let prefix = normalize_prefix(prefix);
    match naming {
        RouteNaming::NamespacedPlural => format!(
            "{prefix}{}/{}",
            kebab_case(&model.namespace),
            kebab_case(&model.plural_name)
        ),
        RouteNaming::FlatName => format!("{prefix}{}", kebab_case(&model.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_cases_like_a_slug() {
        assert_eq!(kebab_case("Invoices"), "invoices");
        assert_eq!(kebab_case("LineItems"), "line-items");
        assert_eq!(kebab_case("line_items"), "line-items");
        assert_eq!(kebab_case("Line Items"), "line-items");
        assert_eq!(kebab_case("XMLHttpRequests"), "xml-http-requests");
        assert_eq!(kebab_case("apiV2Keys"), "api-v-2-keys");
        assert_eq!(kebab_case("--already-kebab--"), "already-kebab");
        assert_eq!(kebab_case(""), "");
    }

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix(""), "/");
        assert_eq!(normalize_prefix("api"), "/api/");
        assert_eq!(normalize_prefix("/api/v1"), "/api/v1/");
    }

    #[test]
    fn namespaced_plural_is_canonical() {
        let model = ModelInfo::new("Invoice", "billing", "Invoices");
        assert_eq!(base_path("/", &model, RouteNaming::default()), "/billing/invoices");
        assert_eq!(base_path("/api/", &model, RouteNaming::NamespacedPlural), "/api/billing/invoices");

        let other = ModelInfo::new("Invoice", "purchasing", "Invoices");
        assert_ne!(
            base_path("/", &model, RouteNaming::NamespacedPlural),
            base_path("/", &other, RouteNaming::NamespacedPlural)
        );
    }

    #[test]
    fn flat_name_uses_singular_name_only() {
        let model = ModelInfo::new("PurchaseOrder", "billing", "PurchaseOrders");
        assert_eq!(base_path("/", &model, RouteNaming::FlatName), "/purchase-order");
    }
}
