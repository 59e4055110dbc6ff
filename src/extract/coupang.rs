use crate::crawler::error::ExtractionError;
use crate::crawler::task::Product;
use crate::extract::{
    first, image_src, model_name, parse_amount, parse_shipping_fee, product_id, text_of,
    PageExtractor, RenderedPage, UrlPattern,
};

static PRODUCT_ID: UrlPattern = UrlPattern::new(r"/vp/products/(\d+)");
const TITLE: &str = ".prod-buy-header__title";
const IMAGE: &str = ".prod-image-container .prod-image__item--active img";
const PRICE: &str = ".prod-sale-price .total-price > strong";
const SHIPPING: &str = ".shipping-fee-txt";
const SOLD_OUT: &str = ".out-of-stock-badge";

/// Product pages on coupang.com
pub struct CoupangExtractor;

impl PageExtractor for CoupangExtractor {
    fn site(&self) -> &'static str {
        "coupang"
    }

    fn domains(&self) -> &[&'static str] {
        &["coupang.com"]
    }

    fn ready_selector(&self) -> &'static str {
        TITLE
    }

    fn extract(&self, page: &RenderedPage) -> Result<Product, ExtractionError> {
        let document = page.document();

        let title = text_of(&document, TITLE)?
            .filter(|t| !t.is_empty())
            .ok_or(ExtractionError::MissingField("title"))?;

        let price = text_of(&document, PRICE)?
            .map(|t| parse_amount(&t))
            .unwrap_or(0);

        let shipping_fee = text_of(&document, SHIPPING)?
            .map(|t| parse_shipping_fee(&t))
            .unwrap_or(0);

        Ok(Product {
            product_id: product_id(&page.url, &PRODUCT_ID)?,
            image: image_src(first(&document, IMAGE)?),
            price,
            model_name: model_name(&title),
            shipping_fee,
            // Coupang does not list a return fee on the product page
            return_fee: 0,
            sold_out: first(&document, SOLD_OUT)?.is_some(),
            title,
        })
    }
}
