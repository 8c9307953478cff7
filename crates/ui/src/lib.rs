//! Page layout shared by every view.
use db::user::User;
use maud::{html, Markup, DOCTYPE};

/// How a one-line message at the top of a page is styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    fn alert_class(&self) -> &'static str {
        match self {
            FlashKind::Success => "alert alert-success",
            FlashKind::Error => "alert alert-danger",
        }
    }

    /// Maps the kind string of a `rocket::request::FlashMessage`.
    pub fn from_flash(kind: &str) -> FlashKind {
        match kind {
            "success" => FlashKind::Success,
            _ => FlashKind::Error,
        }
    }
}

pub fn flash_alert(kind: FlashKind, msg: &str) -> Markup {
    html! {
        div class=(kind.alert_class()) role="alert" { (msg) }
    }
}

pub fn page_of_body_and_flash_msg(
    body: Markup,
    flash: Option<(FlashKind, String)>,
    user: Option<User>,
) -> Markup {
    page_of_body(
        maud::html! {
            @if let Some((kind, flash_msg)) = flash {
                div class="mt-3" {
                    (flash_alert(kind, &flash_msg))
                }
            }
            (body)
        },
        user,
    )
}

pub fn page_of_body_with_extra_head(
    body: Markup,
    user: Option<User>,
    extra_head: Option<Markup>,
) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                title { "Pollbooth" }
                script src="https://unpkg.com/htmx.org@2.0.2" integrity="sha384-Y7hw+L/jvKeWIRRkqWYfPcvVxHzVzn5REgzbawhxAuQGwX1XWe70vji+VSeHOThJ" crossorigin="anonymous" {}
                script src="https://unpkg.com/htmx-ext-sse@2.2.2/sse.js" crossorigin="anonymous" {}
                link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-QWTKZyjpPEjISv5WaRU9OFeRpok6YctnYmDr5pNlyT2bRjXh0JMhjY6hW+ALEwIH" crossorigin="anonymous" {}
                meta name="viewport" content="width=device-width, initial-scale=1" {}
                @if let Some(head) = extra_head {
                    (head)
                }
            }
            body {
                nav class="navbar navbar-expand" style="background-color: #1F4E79" data-bs-theme="dark" {
                    div class="container-fluid" {
                        ul class="nav nav-justify-start" {
                            li class="nav-item" {
                                a class="nav-link text-white" href="/polls" { "Polls" }
                            }
                            @if user.as_ref().is_some_and(|u| u.is_admin()) {
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/polls/new" { "New poll" }
                                }
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/debug/db" { "Tables" }
                                }
                            }
                        }
                        ul class="nav nav-justify-end" {
                            @if let Some(user) = &user {
                                li class="nav-item" {
                                    span class="nav-link text-white-50" {
                                        (user.email) " (" (user.role()) ")"
                                    }
                                }
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/account" { "Account" }
                                }
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/logout" { "Logout" }
                                }
                            } @else {
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/login" { "Login" }
                                }
                                li class="nav-item" {
                                    a class="nav-link text-white" href="/signup" { "Sign up" }
                                }
                            }
                        }
                    }
                }
                div class="container" {
                    div class="mt-4" {
                        (body)
                    }
                }
            }
        }
    }
}

/// Renders an HTML page with the provided body markup.
pub fn page_of_body(body: Markup, user: Option<User>) -> Markup {
    page_of_body_with_extra_head(body, user, None)
}

fn error_page<T: ToString>(
    code: u16,
    heading: &str,
    lead: &str,
    error: Option<T>,
    user: Option<User>,
) -> Markup {
    page_of_body(
        html! {
            div class="text-center" {
                h1 class="display-1 text-danger" { (code) }
                h2 class="mb-4" { (heading) }
                p class="lead" { (lead) }
                @if let Some(err) = error {
                    div class="alert alert-danger" role="alert" {
                        (err.to_string())
                    }
                }
                a class="btn btn-primary" href="/polls" { "Back to polls" }
            }
        },
        user,
    )
}

pub fn error_400<T: ToString>(error: Option<T>, user: Option<User>) -> Markup {
    error_page(400, "Bad request", "That request could not be processed.", error, user)
}

pub fn error_403<T: ToString>(error: Option<T>, user: Option<User>) -> Markup {
    error_page(
        403,
        "Forbidden",
        "You don't have permission to access this resource.",
        error,
        user,
    )
}

pub fn error_404<T: ToString>(error: Option<T>, user: Option<User>) -> Markup {
    error_page(404, "Not found", "That page does not exist.", error, user)
}

pub fn error_500<T: ToString>(error: Option<T>, user: Option<User>) -> Markup {
    error_page(
        500,
        "Something went wrong",
        "The server could not complete this request.",
        error,
        user,
    )
}

pub fn page_title<T: ToString>(title: T) -> Markup {
    maud::html! {
        div class="col-md m-3 h2 d-flex align-items-center" {
            h1 { (title.to_string()) }
        }
    }
}
