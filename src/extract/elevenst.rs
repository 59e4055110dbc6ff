use crate::crawler::error::ExtractionError;
use crate::crawler::task::Product;
use crate::extract::{
    first, image_src, model_name, parse_amount, parse_shipping_fee, product_id, text_of,
    PageExtractor, RenderedPage, UrlPattern,
};

static PRODUCT_ID: UrlPattern = UrlPattern::new(r"/products/(\d+)");
const READY: &str = ".c_product_info_title_coupon h1.title, .c_product_info_title h1.title";
const TITLE: &str = ".c_product_info_title h1.title";
const TITLE_FALLBACK: &str = ".c_product_info_title .title_sub";
const IMAGE: &str = ".c_product_view_img img";
const PRICE: &str = "#finalDscPrcArea .price .value";
const SHIPPING: &str = ".delivery dt";
const SOLD_OUT: &str = ".out-of-stock-badge, .sold-out, .oos-icon";

/// Product pages on 11st.co.kr
pub struct ElevenStreetExtractor;

impl PageExtractor for ElevenStreetExtractor {
    fn site(&self) -> &'static str {
        "11st"
    }

    fn domains(&self) -> &[&'static str] {
        &["11st.co.kr"]
    }

    fn ready_selector(&self) -> &'static str {
        READY
    }

    fn extract(&self, page: &RenderedPage) -> Result<Product, ExtractionError> {
        let document = page.document();

        let title = match text_of(&document, TITLE)?.filter(|t| !t.is_empty()) {
            Some(title) => title,
            None => text_of(&document, TITLE_FALLBACK)?
                .filter(|t| !t.is_empty())
                .ok_or(ExtractionError::MissingField("title"))?,
        };

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
            return_fee: 0,
            sold_out: first(&document, SOLD_OUT)?.is_some(),
            title,
        })
    }
}
