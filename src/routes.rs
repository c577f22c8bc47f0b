pub mod routes;

pub mod customer {
    pub mod customer_handlers;
    pub mod customer_models;
}

pub mod loan {
    pub mod loan_handlers;
    pub mod loan_models;
}
