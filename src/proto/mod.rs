// Generated by tonic-build from proto/ (see build.rs)

pub mod common {
    include!("roster.common.rs");
}

pub mod auth {
    include!("roster.auth.rs");
}

pub mod member {
    include!("roster.member.rs");
}

pub mod items {
    include!("roster.items.rs");
}

pub mod logs {
    include!("roster.logs.rs");
}

pub mod organization {
    include!("roster.organization.rs");
}

pub mod health {
    include!("grpc.health.v1.rs");
}
