//! HTML pages. Every user-supplied value goes through `escape`.

use std::fmt::Write as _;

use axum::http::StatusCode;

use crate::{
    domain::{ArchiveEntry, Request, Status},
    notify::escape,
};

const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

fn page(organisation: &str, title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"fr\"><head><meta charset=\"utf-8\">\
         <title>{title} · {organisation}</title>\
         <style>body{{font-family:Arial,sans-serif;margin:2em;color:#222}}\
         table{{border-collapse:collapse}}td,th{{border:1px solid #ccc;padding:4px 8px;vertical-align:top}}\
         .error{{color:#b00}}.duplicate{{background:#fff3cd}}</style></head>\
         <body><h1>{title}</h1>{body}</body></html>",
        title = escape(title),
        organisation = escape(organisation),
    )
}

pub fn form_page(organisation: &str) -> String {
    let fields = [
        ("nom", "Nom", "text"),
        ("prenom", "Prénom", "text"),
        ("telephone", "Téléphone", "tel"),
        ("mail", "Email", "email"),
        ("motif", "Motif", "text"),
    ];
    let mut body = String::from("<form method=\"post\" enctype=\"multipart/form-data\">");
    for (name, label, kind) in fields {
        let _ = write!(
            body,
            "<p><label>{label}<br><input type=\"{kind}\" name=\"{name}\" required></label></p>"
        );
    }
    body.push_str(
        "<p><label>Détails<br><textarea name=\"details\" rows=\"6\" cols=\"60\"></textarea></label></p>\
         <p><label>Justificatif<br><input type=\"file\" name=\"fichier\"></label></p>\
         <p><button type=\"submit\">Envoyer</button></p></form>",
    );
    page(organisation, "Demande de stage", &body)
}

pub fn confirmation_page(organisation: &str, request: &Request) -> String {
    let body = format!(
        "<p>Merci {} {}, votre demande a bien été enregistrée.</p>\
         <p>Un accusé de réception a été envoyé à {}.</p><p><a href=\"/\">Retour</a></p>",
        escape(&request.identity.prenom),
        escape(&request.identity.nom),
        escape(&request.identity.mail),
    );
    page(organisation, "Demande enregistrée", &body)
}

pub fn duplicate_page(organisation: &str) -> String {
    page(
        organisation,
        "Demande déjà reçue",
        "<p>Une demande identique a déjà été enregistrée. Elle sera traitée dans les \
         meilleurs délais.</p><p><a href=\"/\">Retour</a></p>",
    )
}

pub fn admin_page(organisation: &str, requests: &[Request], processed: u64) -> String {
    let mut body = format!(
        "<p>{} demande(s) en cours, {processed} traitée(s) au total. \
         <a href=\"/archives\">Archives</a></p>",
        requests.len()
    );
    body.push_str(
        "<table><tr><th>Date</th><th>Demandeur</th><th>Motif</th><th>Pièces</th>\
         <th>Suivi</th><th></th></tr>",
    );
    for request in requests {
        admin_row(&mut body, request);
    }
    body.push_str("</table>");
    page(organisation, "Administration", &body)
}

fn admin_row(body: &mut String, request: &Request) {
    let id = request.id;
    let identity = &request.identity;
    let class = if request.duplicate { " class=\"duplicate\"" } else { "" };

    let _ = write!(
        body,
        "<tr{class} id=\"{id}\"><td>{}</td><td>{} {}<br>{}<br>{}</td><td><strong>{}</strong><br>{}</td><td>",
        request.created.format(DATE_FORMAT),
        escape(&identity.prenom),
        escape(&identity.nom),
        escape(&identity.telephone),
        escape(&identity.mail),
        escape(&request.motif),
        escape(&request.details).replace('\n', "<br>"),
    );
    for key in request.files() {
        let key = escape(key);
        let _ = write!(
            body,
            "<a href=\"/uploads/{key}\">{key}</a>\
             <form method=\"post\" action=\"/admin/{id}/attachments/{key}/delete\" style=\"display:inline\">\
             <button type=\"submit\">×</button></form><br>"
        );
    }

    let options: String = [Status::NotProcessed, Status::Processed]
        .into_iter()
        .map(|status| {
            let selected = if status == request.status { " selected" } else { "" };
            format!("<option{selected}>{status}</option>")
        })
        .collect();
    let _ = write!(
        body,
        "</td><td><form method=\"post\" action=\"/admin\" enctype=\"multipart/form-data\">\
         <input type=\"hidden\" name=\"action\" value=\"update\">\
         <input type=\"hidden\" name=\"id\" value=\"{id}\">\
         Attribution <input name=\"attribution\" value=\"{}\"><br>\
         Email <input name=\"mail\" value=\"{}\"><br>\
         Statut <select name=\"statut\">{options}</select><br>\
         <textarea name=\"commentaire\" rows=\"3\" cols=\"30\">{}</textarea><br>\
         <input type=\"file\" name=\"fichiers\" multiple><br>\
         <button type=\"submit\">Enregistrer</button></form>",
        escape(&request.assignee),
        escape(&identity.mail),
        escape(&request.comment),
    );

    if let Some(error) = &request.email_error {
        let _ = write!(
            body,
            "<p class=\"error\">Échec de l'envoi de l'email : {}</p>",
            escape(error)
        );
    }
    if let Some(sent) = request.confirmation_sent {
        let _ = write!(
            body,
            "<p>Email envoyé le {} (<a href=\"/email/{id}\">voir</a>)</p>",
            sent.format(DATE_FORMAT)
        );
    }

    let _ = write!(
        body,
        "</td><td><a href=\"/imprimer/{id}\">Imprimer</a>\
         <form method=\"post\" action=\"/admin\" enctype=\"multipart/form-data\">\
         <input type=\"hidden\" name=\"action\" value=\"delete\">\
         <input type=\"hidden\" name=\"id\" value=\"{id}\">\
         <button type=\"submit\">Supprimer</button></form></td></tr>"
    );
}

pub fn print_page(organisation: &str, request: &Request) -> String {
    let identity = &request.identity;
    let rows = [
        ("Date", request.created.format(DATE_FORMAT).to_string()),
        ("Nom", identity.nom.clone()),
        ("Prénom", identity.prenom.clone()),
        ("Téléphone", identity.telephone.clone()),
        ("Email", identity.mail.clone()),
        ("Motif", request.motif.clone()),
        ("Détails", request.details.clone()),
        ("Attribution", request.assignee.clone()),
        ("Statut", request.status.to_string()),
        ("Commentaire", request.comment.clone()),
    ];
    let mut body = String::from("<table>");
    for (label, value) in rows {
        let _ = write!(
            body,
            "<tr><th align=\"left\">{label}</th><td>{}</td></tr>",
            escape(&value).replace('\n', "<br>")
        );
    }
    body.push_str("</table><script>window.print()</script>");
    page(organisation, "Demande de stage", &body)
}

pub fn email_page(organisation: &str, request: &Request) -> Option<String> {
    let sent = request.sent_email.as_ref()?;
    let body = format!(
        "<p><strong>À :</strong> {}<br><strong>Objet :</strong> {}</p>\
         <iframe srcdoc=\"{}\" style=\"width:100%;height:400px;border:1px solid #ccc\"></iframe>\
         <h2>Version texte</h2><pre>{}</pre><p><a href=\"/admin\">Retour</a></p>",
        escape(&request.identity.mail),
        escape(&sent.subject),
        escape(&sent.html),
        escape(&sent.text),
    );
    Some(page(organisation, "Email envoyé", &body))
}

pub fn archive_page(organisation: &str, query: &str, entries: &[ArchiveEntry]) -> String {
    let mut body = format!(
        "<form method=\"get\"><input name=\"q\" value=\"{}\" placeholder=\"Rechercher\">\
         <button type=\"submit\">Rechercher</button></form>\
         <p>{} résultat(s). <a href=\"/admin\">Retour</a></p>\
         <table><tr><th>Supprimée le</th><th>Déposée le</th><th>Demandeur</th><th>Motif</th><th>Statut</th></tr>",
        escape(query),
        entries.len()
    );
    for entry in entries {
        let request = &entry.request;
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{} {}<br>{}</td><td>{}</td><td>{}</td></tr>",
            entry.archived.format(DATE_FORMAT),
            request.created.format(DATE_FORMAT),
            escape(&request.identity.prenom),
            escape(&request.identity.nom),
            escape(&request.identity.mail),
            escape(&request.motif),
            request.status,
        );
    }
    body.push_str("</table>");
    page(organisation, "Archives", &body)
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"fr\"><head><meta charset=\"utf-8\"><title>{status}</title></head>\
         <body><h1>{}</h1><p>{}</p></body></html>",
        status.as_u16(),
        escape(message)
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Identity, Submission};

    fn request() -> Request {
        Request::new(
            Uuid::new_v4(),
            Submission {
                identity: Identity {
                    nom: "<b>Dupont</b>".to_string(),
                    ..Identity::default()
                },
                motif: "Stage".to_string(),
                details: String::new(),
            },
            Utc::now().fixed_offset(),
        )
    }

    #[test]
    fn admin_page_escapes_user_text() {
        let html = admin_page("Stages", &[request()], 0);
        assert!(html.contains("&lt;b&gt;Dupont&lt;/b&gt;"));
        assert!(!html.contains("<b>Dupont"));
    }

    #[test]
    fn admin_page_shows_email_error() {
        let mut request = request();
        request.email_error = Some("connection refused".to_string());
        let html = admin_page("Stages", &[request], 0);
        assert!(html.contains("connection refused"));
    }

    #[test]
    fn email_page_needs_a_sent_email() {
        assert!(email_page("Stages", &request()).is_none());
    }
}
