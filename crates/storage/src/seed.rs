use crate::{Database, NewCustomer, QueryError};

const PLACEHOLDER_CUSTOMERS: &[(&str, &str, &str)] = &[
    ("Evil Rabbit", "evil@rabbit.com", "/customers/evil-rabbit.png"),
    ("Delba de Oliveira", "delba@oliveira.com", "/customers/delba-de-oliveira.png"),
    ("Lee Robinson", "lee@robinson.com", "/customers/lee-robinson.png"),
    ("Michael Novotny", "michael@novotny.com", "/customers/michael-novotny.png"),
    ("Amy Burns", "amy@burns.com", "/customers/amy-burns.png"),
    ("Balazs Orban", "balazs@orban.com", "/customers/balazs-orban.png"),
];

/// Inserts the placeholder customer list into an empty `customers` table.
///
/// Returns how many rows were written; a table that already has customers is
/// left alone and `0` is returned.
pub async fn seed_placeholder_customers(db: &Database) -> Result<usize, QueryError> {
    let customers = db.customers();
    if customers.count().await? > 0 {
        return Ok(0);
    }

    for (name, email, image_url) in PLACEHOLDER_CUSTOMERS {
        customers
            .insert(&NewCustomer {
                name: (*name).to_string(),
                email: (*email).to_string(),
                image_url: (*image_url).to_string(),
            })
            .await?;
    }
    Ok(PLACEHOLDER_CUSTOMERS.len())
}
