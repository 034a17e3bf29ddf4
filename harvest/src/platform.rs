pub const MERCADOLIVRE: &str = "mercadolivre";
pub const AMAZON: &str = "amazon";

/// Guess the platform tag from a product url.
pub fn detect_platform(url: &str) -> Option<&'static str> {
    let url = url.to_lowercase();
    if url.contains("mercadolivre.com") || url.contains("mercadolibre.com") {
        Some(MERCADOLIVRE)
    } else if url.contains("amazon.com") || url.contains("amzn.to") {
        Some(AMAZON)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_platforms() {
        assert_eq!(
            detect_platform("https://produto.mercadolivre.com.br/MLB-123"),
            Some(MERCADOLIVRE)
        );
        assert_eq!(
            detect_platform("https://articulo.MercadoLibre.com.ar/MLA-1"),
            Some(MERCADOLIVRE)
        );
        assert_eq!(
            detect_platform("https://www.amazon.com.br/dp/B0ABCDEFGH"),
            Some(AMAZON)
        );
        assert_eq!(detect_platform("https://amzn.to/3xYz"), Some(AMAZON));
    }

    #[test]
    fn unknown_platform() {
        assert_eq!(detect_platform("https://shopee.com.br/item"), None);
    }
}
