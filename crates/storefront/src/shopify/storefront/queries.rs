//! GraphQL document definitions for the Storefront API.
//!
//! Documents are hand-written strings built from shared fragments. The wire
//! shapes they produce are decoded by the types in [`super::response`].

use std::sync::LazyLock;

/// Fields selected on every cart payload.
const CART_FIELDS: &str = r"
fragment CartFields on Cart {
  id
  checkoutUrl
  totalQuantity
  cost {
    subtotalAmount {
      amount
      currencyCode
    }
  }
  lines(first: 100) {
    nodes {
      id
      quantity
      merchandise {
        ... on ProductVariant {
          id
          title
          price {
            amount
            currencyCode
          }
          image {
            url
          }
          product {
            id
            title
          }
        }
      }
    }
  }
}";

/// Fields selected on every product payload.
const PRODUCT_FIELDS: &str = r"
fragment ProductFields on Product {
  id
  handle
  title
  description
  availableForSale
  tags
  featuredImage {
    url
    altText
  }
  images(first: 10) {
    nodes {
      url
      altText
    }
  }
  variants(first: 50) {
    nodes {
      id
      title
      availableForSale
      quantityAvailable
      price {
        amount
        currencyCode
      }
      compareAtPrice {
        amount
        currencyCode
      }
      image {
        url
        altText
      }
    }
  }
  priceRange {
    minVariantPrice {
      amount
      currencyCode
    }
  }
}";

// =============================================================================
// Catalog documents
// =============================================================================

pub static GET_PRODUCTS: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"query GetProducts($first: Int!, $after: String) {{
  products(first: $first, after: $after) {{
    pageInfo {{
      hasNextPage
      endCursor
    }}
    nodes {{
      ...ProductFields
    }}
  }}
}}
{PRODUCT_FIELDS}"
    )
});

pub static GET_PRODUCT_BY_HANDLE: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"query GetProductByHandle($handle: String!) {{
  product(handle: $handle) {{
    ...ProductFields
  }}
}}
{PRODUCT_FIELDS}"
    )
});

pub static GET_COLLECTIONS: LazyLock<String> = LazyLock::new(|| {
    r"query GetCollections($first: Int!, $after: String) {
  collections(first: $first, after: $after) {
    pageInfo {
      hasNextPage
      endCursor
    }
    nodes {
      id
      handle
      title
      description
      image {
        url
        altText
      }
    }
  }
}"
    .to_string()
});

pub static VARIANT_AVAILABILITY: LazyLock<String> = LazyLock::new(|| {
    r"query VariantAvailability($id: ID!) {
  node(id: $id) {
    ... on ProductVariant {
      quantityAvailable
    }
  }
}"
    .to_string()
});

// =============================================================================
// Cart documents
// =============================================================================

pub static CREATE_CART: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"mutation CreateCart($input: CartInput!) {{
  cartCreate(input: $input) {{
    cart {{
      ...CartFields
    }}
    userErrors {{
      code
      field
      message
    }}
  }}
}}
{CART_FIELDS}"
    )
});

pub static GET_CART: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"query GetCart($cartId: ID!) {{
  cart(id: $cartId) {{
    ...CartFields
  }}
}}
{CART_FIELDS}"
    )
});

pub static ADD_CART_LINES: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"mutation AddCartLines($cartId: ID!, $lines: [CartLineInput!]!) {{
  cartLinesAdd(cartId: $cartId, lines: $lines) {{
    cart {{
      ...CartFields
    }}
    userErrors {{
      code
      field
      message
    }}
  }}
}}
{CART_FIELDS}"
    )
});

pub static UPDATE_CART_LINES: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"mutation UpdateCartLines($cartId: ID!, $lines: [CartLineUpdateInput!]!) {{
  cartLinesUpdate(cartId: $cartId, lines: $lines) {{
    cart {{
      ...CartFields
    }}
    userErrors {{
      code
      field
      message
    }}
  }}
}}
{CART_FIELDS}"
    )
});

pub static REMOVE_CART_LINES: LazyLock<String> = LazyLock::new(|| {
    format!(
        r"mutation RemoveCartLines($cartId: ID!, $lineIds: [ID!]!) {{
  cartLinesRemove(cartId: $cartId, lineIds: $lineIds) {{
    cart {{
      ...CartFields
    }}
    userErrors {{
      code
      field
      message
    }}
  }}
}}
{CART_FIELDS}"
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_include_their_fragments() {
        assert!(GET_PRODUCTS.contains("fragment ProductFields"));
        assert!(GET_PRODUCT_BY_HANDLE.contains("fragment ProductFields"));
        for doc in [
            &*CREATE_CART,
            &*GET_CART,
            &*ADD_CART_LINES,
            &*UPDATE_CART_LINES,
            &*REMOVE_CART_LINES,
        ] {
            assert!(doc.contains("fragment CartFields"), "missing fragment");
        }
    }

    #[test]
    fn mutations_select_user_errors() {
        for doc in [
            &*CREATE_CART,
            &*ADD_CART_LINES,
            &*UPDATE_CART_LINES,
            &*REMOVE_CART_LINES,
        ] {
            assert!(doc.contains("userErrors"), "mutation must select userErrors");
        }
    }
}
