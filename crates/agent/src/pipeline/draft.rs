//! Rendering of the automatic reply email.

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_reply_html(reply: &str, ticket_id: &str) -> String {
    let body = escape_html(reply).replace("\r\n", "\n").replace('\n', "<br>");
    format!(
        r#"<div style="font-family: Arial, sans-serif; line-height: 1.6;">
  <p>Olá,</p>
  <p>Obrigado por entrar em contato. Aqui está nossa resposta:</p>
  <div style="background: #f5f5f5; padding: 15px; border-radius: 5px; margin: 20px 0;">
    {body}
  </div>
  <p>Se precisar de mais informações, responda este e-mail.</p>
  <hr>
  <p style="font-size: 12px; color: #666;">
    Ticket #{ticket} | Sistema KVN Suporte
  </p>
</div>"#,
        body = body,
        ticket = escape_html(ticket_id),
    )
}

pub fn render_reply_text(reply: &str, ticket_id: &str) -> String {
    format!(
        "Olá,\n\nObrigado por entrar em contato. Aqui está nossa resposta:\n\n{}\n\nSe precisar de mais informações, responda este e-mail.\n\n--\nTicket #{} | Sistema KVN Suporte\n",
        reply, ticket_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escapes_and_breaks_lines() {
        let html = render_reply_html("Hi <b>Jane</b>\nline two", "t-1");
        assert!(html.contains("Hi &lt;b&gt;Jane&lt;/b&gt;<br>line two"));
        assert!(html.contains("Ticket #t-1"));
    }

    #[test]
    fn text_keeps_the_reply_verbatim() {
        let text = render_reply_text("Use <forgot password>.", "t-1");
        assert!(text.contains("Use <forgot password>."));
        assert!(text.ends_with("Ticket #t-1 | Sistema KVN Suporte\n"));
    }
}
