use ntex::web;

/// Configures webhook routes.
///
/// These routes are public endpoints authenticated by the WhatsApp verify
/// token and the payload signature, never by a session.
///
/// # Routes
/// - `GET /webhook` - WhatsApp webhook verification
/// - `POST /webhook` - WhatsApp webhook receiver
pub fn whatsapp(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhook").service((super::whatsapp::verify, super::whatsapp::receive)),
    );
}
