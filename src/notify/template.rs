//! Email bodies.
//!
//! Each message has a plain-text body and an HTML body built from the same
//! branded layout. User-supplied text is escaped before it reaches the HTML.

use std::fmt::Write as _;

use crate::domain::Request;

/// Subject, plain text and HTML of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Branding shared by every message.
#[derive(Debug, Clone, Copy)]
pub struct Branding<'a> {
    pub organisation: &'a str,
    pub logo: bool,
}

/// Alert sent to staff when a request arrives.
pub fn new_request(request: &Request, branding: Branding<'_>) -> Rendered {
    let identity = &request.identity;
    let subject = format!(
        "[{}] Nouvelle demande : {} {}",
        branding.organisation, identity.prenom, identity.nom
    );

    let mut fields = vec![
        ("Nom", identity.nom.as_str()),
        ("Prénom", identity.prenom.as_str()),
        ("Téléphone", identity.telephone.as_str()),
        ("Email", identity.mail.as_str()),
        ("Motif", request.motif.as_str()),
        ("Détails", request.details.as_str()),
    ];
    if request.duplicate {
        fields.push(("Attention", "demande probablement en double"));
    }

    let mut text = String::from("Une nouvelle demande a été déposée.\n\n");
    for (label, value) in &fields {
        let _ = writeln!(text, "{label} : {value}");
    }
    let _ = writeln!(text, "Date : {}", request.created.format("%d/%m/%Y %H:%M"));

    let mut rows = String::new();
    for (label, value) in &fields {
        let _ = write!(
            rows,
            "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
            escape(label),
            escape(value)
        );
    }
    let body = format!(
        "<p>Une nouvelle demande a été déposée le {}.</p><table>{rows}</table>",
        request.created.format("%d/%m/%Y à %H:%M")
    );

    Rendered {
        subject,
        text,
        html: layout(branding, &body),
    }
}

/// Acknowledgment sent to the requester after submission.
pub fn acknowledgment(request: &Request, branding: Branding<'_>) -> Rendered {
    let identity = &request.identity;
    let subject = format!("[{}] Accusé de réception de votre demande", branding.organisation);

    let text = format!(
        "Bonjour {} {},\n\nNous avons bien reçu votre demande « {} ». \
         Elle sera étudiée dans les meilleurs délais et vous serez informé(e) \
         par email de la suite qui lui sera donnée.\n\n{}\n",
        identity.prenom, identity.nom, request.motif, branding.organisation
    );

    let body = format!(
        "<p>Bonjour {} {},</p><p>Nous avons bien reçu votre demande \
         « <strong>{}</strong> ». Elle sera étudiée dans les meilleurs délais \
         et vous serez informé(e) par email de la suite qui lui sera donnée.</p>",
        escape(&identity.prenom),
        escape(&identity.nom),
        escape(&request.motif)
    );

    Rendered {
        subject,
        text,
        html: layout(branding, &body),
    }
}

/// Notice sent to the requester when the request is processed.
pub fn completed(request: &Request, branding: Branding<'_>) -> Rendered {
    let identity = &request.identity;
    let subject = format!("[{}] Votre demande a été traitée", branding.organisation);

    let mut text = format!(
        "Bonjour {} {},\n\nVotre demande « {} » a été traitée.\n",
        identity.prenom, identity.nom, request.motif
    );
    if !request.comment.is_empty() {
        let _ = write!(text, "\nCommentaire : {}\n", request.comment);
    }
    if !request.attachments.is_empty() {
        text.push_str("\nVous trouverez les documents correspondants en pièce jointe.\n");
    }
    let _ = write!(text, "\n{}\n", branding.organisation);

    let mut body = format!(
        "<p>Bonjour {} {},</p><p>Votre demande « <strong>{}</strong> » a été traitée.</p>",
        escape(&identity.prenom),
        escape(&identity.nom),
        escape(&request.motif)
    );
    if !request.comment.is_empty() {
        let _ = write!(
            body,
            "<p><em>Commentaire :</em><br>{}</p>",
            escape(&request.comment).replace('\n', "<br>")
        );
    }
    if !request.attachments.is_empty() {
        body.push_str("<p>Vous trouverez les documents correspondants en pièce jointe.</p>");
    }

    Rendered {
        subject,
        text,
        html: layout(branding, &body),
    }
}

fn layout(branding: Branding<'_>, body: &str) -> String {
    let logo = if branding.logo {
        "<img src=\"cid:logo\" alt=\"\" style=\"max-height:64px\"><br>"
    } else {
        ""
    };
    let organisation = escape(branding.organisation);
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,sans-serif;color:#222\">\
         <div style=\"border-bottom:3px solid #1f4e79;padding:12px 0\">{logo}\
         <strong style=\"color:#1f4e79\">{organisation}</strong></div>\
         <div style=\"padding:16px 0\">{body}</div>\
         <div style=\"border-top:1px solid #ccc;color:#777;font-size:12px;padding-top:8px\">\
         {organisation} · message automatique, merci de ne pas y répondre.</div>\
         </body></html>"
    )
}

/// Escape text for inclusion in HTML.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
